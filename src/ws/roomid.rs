use rand::Rng;

const ROOM_ID_MIN: u32 = 100_000;
const ROOM_ID_MAX: u32 = 1_000_000;

/// Draw a six-digit room id that `is_taken` rejects, re-rolling on collision.
pub fn generate_room_id(is_taken: impl Fn(&str) -> bool) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let id = rng.gen_range(ROOM_ID_MIN..ROOM_ID_MAX).to_string();
        if !is_taken(&id) {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashSet;

    #[test]
    fn ids_are_six_decimal_digits() {
        for _ in 0..200 {
            let id = generate_room_id(|_| false);
            assert_eq!(id.len(), 6);
            assert!(id.chars().all(|c| c.is_ascii_digit()));
            assert_ne!(id.as_bytes()[0], b'0');
        }
    }

    #[test]
    fn collisions_are_re_rolled() {
        let attempts = Cell::new(0);
        let id = generate_room_id(|_| {
            attempts.set(attempts.get() + 1);
            attempts.get() < 4
        });
        assert_eq!(attempts.get(), 4);
        assert_eq!(id.len(), 6);
    }

    #[test]
    fn never_returns_a_live_id() {
        let live: HashSet<String> = (ROOM_ID_MIN..ROOM_ID_MIN + 50_000).map(|n| n.to_string()).collect();
        for _ in 0..100 {
            let id = generate_room_id(|candidate| live.contains(candidate));
            assert!(!live.contains(&id));
        }
    }
}
