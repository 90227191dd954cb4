//! Membership color assignment.
//!
//! A fresh color is drawn for every join, so the same connection usually
//! shows up with different colors in different rooms. There is no collision
//! avoidance; colors are visual only and never identify anyone.

use huddle_proto::Color;

use crate::env::Environment;

/// Draw a uniformly random `#rrggbb` color.
pub fn random_color<E: Environment>(env: &E) -> Color {
    Color::from_rgb(env.random_u24())
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    /// Environment whose RNG always yields the same byte.
    #[derive(Clone)]
    struct FixedEnv(u8);

    impl Environment for FixedEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            Instant::now()
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(self.0);
        }
    }

    #[test]
    fn color_comes_from_env_randomness() {
        assert_eq!(random_color(&FixedEnv(0xab)).as_str(), "#ababab");
        assert_eq!(random_color(&FixedEnv(0x00)).as_str(), "#000000");
        assert_eq!(random_color(&FixedEnv(0xff)).as_str(), "#ffffff");
    }
}
