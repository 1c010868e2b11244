use serde::{Deserialize, Serialize};

/// Scheduling class of a job (higher values are scheduled first)
///
/// Tiers are plain integers so callers can introduce new classes without a
/// library change; the named constants mirror the account levels the
/// application uses today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityTier(pub u8);

// Queue order is (Reverse(tier), enqueued_at, seq):
// - higher tiers first
// - within a tier, earlier enqueued_at first

impl PriorityTier {
    /// Anonymous guest requests
    pub const GUEST: Self = Self(1);

    /// Regular signed-in accounts
    pub const MEMBER: Self = Self(2);

    /// Paid subscriptions
    pub const PREMIUM: Self = Self(3);

    /// Get the numeric value for ordering
    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self.0 {
            1 => "guest",
            2 => "member",
            3 => "premium",
            _ => "custom",
        }
    }
}

impl Default for PriorityTier {
    fn default() -> Self {
        Self::GUEST
    }
}

impl From<u8> for PriorityTier {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

impl std::str::FromStr for PriorityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "guest" => Ok(Self::GUEST),
            "member" => Ok(Self::MEMBER),
            "premium" => Ok(Self::PREMIUM),
            other => other
                .parse::<u8>()
                .map(Self)
                .map_err(|_| format!("Invalid priority tier: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(PriorityTier::PREMIUM > PriorityTier::MEMBER);
        assert!(PriorityTier::MEMBER > PriorityTier::GUEST);
        assert!(PriorityTier(9) > PriorityTier::PREMIUM);
    }

    #[test]
    fn test_tier_parsing() {
        assert_eq!("premium".parse::<PriorityTier>(), Ok(PriorityTier::PREMIUM));
        assert_eq!("7".parse::<PriorityTier>(), Ok(PriorityTier(7)));
        assert!("gold".parse::<PriorityTier>().is_err());
    }
}
