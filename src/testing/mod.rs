use crate::config::{CacheConfig, Config};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stats::{AccessKind, SourceLocation};

static LOGGER: std::sync::Once = std::sync::Once::new();

pub fn init_logging() {
    LOGGER.call_once(|| {
        env_logger::builder().is_test(true).init();
    });
}

/// Tiny hierarchy with 16 byte lines.
///
/// I1 and D1 have 2 sets of 2 ways, LL has 8 sets of 2 ways.
#[must_use]
pub fn small_config() -> Config {
    Config {
        i1: CacheConfig::new(64, 2, 16),
        d1: CacheConfig::new(64, 2, 16),
        ll: CacheConfig::new(256, 2, 16),
        word_size: 4,
    }
}

/// Deterministic mix of accesses over a 1 KiB region and a few locations.
#[must_use]
pub fn pseudo_random_trace(
    len: usize,
    seed: u64,
) -> Vec<(u64, u32, AccessKind, SourceLocation)> {
    let locations = [
        SourceLocation::new("kernel.c", "init", 12),
        SourceLocation::new("kernel.c", "step", 40),
        SourceLocation::new("main.c", "main", 7),
    ];
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| {
            let addr = rng.gen_range(0..1024u64);
            let size = [1, 2, 4, 8][rng.gen_range(0..4)];
            let kind = match rng.gen_range(0..3) {
                0 => AccessKind::INST_FETCH,
                1 => AccessKind::DATA_READ,
                _ => AccessKind::DATA_WRITE,
            };
            let location = locations[rng.gen_range(0..locations.len())].clone();
            (addr, size, kind, location)
        })
        .collect()
}
