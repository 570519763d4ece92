use serde::{Deserialize, Serialize};

const MIB: i64 = 1024 * 1024;

/// Coarse load level selecting a resource tier. Persisted as an integer (0, 1, 2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum LoadLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl From<i64> for LoadLevel {
    /// Total: anything outside {0, 1, 2} is Medium.
    fn from(level: i64) -> Self {
        match level {
            0 => LoadLevel::Low,
            2 => LoadLevel::High,
            _ => LoadLevel::Medium,
        }
    }
}

impl From<LoadLevel> for i64 {
    fn from(level: LoadLevel) -> Self {
        match level {
            LoadLevel::Low => 0,
            LoadLevel::Medium => 1,
            LoadLevel::High => 2,
        }
    }
}

/// Fixed bundle of CPU, memory and IO limits applied to a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceEnvelope {
    pub cpu_shares: i64,
    /// Bytes.
    pub memory: i64,
    /// Bytes.
    pub memory_reservation: i64,
    /// Memory plus swap ceiling, bytes.
    pub memory_swap: i64,
    /// Block IO weight, 10..=1000.
    pub blkio_weight: u16,
}

const LOW: ResourceEnvelope = ResourceEnvelope {
    cpu_shares: 512,
    memory: 256 * MIB,
    memory_reservation: 128 * MIB,
    memory_swap: 512 * MIB,
    blkio_weight: 300,
};

const MEDIUM: ResourceEnvelope = ResourceEnvelope {
    cpu_shares: 1024,
    memory: 512 * MIB,
    memory_reservation: 256 * MIB,
    memory_swap: 1024 * MIB,
    blkio_weight: 500,
};

const HIGH: ResourceEnvelope = ResourceEnvelope {
    cpu_shares: 2048,
    memory: 1024 * MIB,
    memory_reservation: 512 * MIB,
    memory_swap: 2048 * MIB,
    blkio_weight: 800,
};

pub fn tier(level: LoadLevel) -> ResourceEnvelope {
    match level {
        LoadLevel::Low => LOW,
        LoadLevel::Medium => MEDIUM,
        LoadLevel::High => HIGH,
    }
}

/// Tier lookup for a raw integer level, Medium outside {0, 1, 2}.
pub fn tier_for(level: i64) -> ResourceEnvelope {
    tier(LoadLevel::from(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_levels_map_to_their_tier() {
        assert_eq!(tier_for(0), LOW);
        assert_eq!(tier_for(1), MEDIUM);
        assert_eq!(tier_for(2), HIGH);
    }

    #[test]
    fn out_of_range_levels_fall_back_to_medium() {
        for level in [-1, -100, 3, 42, i64::MIN, i64::MAX] {
            assert_eq!(tier_for(level), MEDIUM, "level {level}");
        }
    }

    #[test]
    fn tiers_grow_with_load() {
        assert!(LOW.cpu_shares < MEDIUM.cpu_shares && MEDIUM.cpu_shares < HIGH.cpu_shares);
        assert!(LOW.memory < MEDIUM.memory && MEDIUM.memory < HIGH.memory);
        for envelope in [LOW, MEDIUM, HIGH] {
            assert!(envelope.memory_reservation <= envelope.memory);
            assert!(envelope.memory_swap >= envelope.memory);
            assert!((10..=1000).contains(&envelope.blkio_weight));
        }
    }

    #[test]
    fn load_level_persists_as_integer() {
        assert_eq!(serde_json::to_string(&LoadLevel::High).unwrap(), "2");
        let level: LoadLevel = serde_json::from_str("7").unwrap();
        assert_eq!(level, LoadLevel::Medium);
    }
}
