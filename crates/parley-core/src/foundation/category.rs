//! Event categories used to key callback chains.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The routing tag of an [`Event`](super::Event).
///
/// Serialized as the upper-case wire name (`"CMND"`, `"OUTPUT"`, ...).
/// Unknown names round-trip through [`EventCategory::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum EventCategory {
    /// Emitted once after a worker finished connecting and joining.
    Start,
    /// Text that was just transmitted by the output loop.
    Output,
    /// A line of user input that may carry a command.
    #[default]
    Command,
    /// A plain chat message.
    Message,
    /// Periodic timer event.
    Tick,
    /// Someone joined a channel.
    Join,
    /// Someone left a channel.
    Part,
    /// A remote envelope received from another bot.
    Remote,
    /// Any protocol-specific category.
    Other(String),
}

impl EventCategory {
    /// Returns the wire name of the category.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Start => "START",
            Self::Output => "OUTPUT",
            Self::Command => "CMND",
            Self::Message => "MESSAGE",
            Self::Tick => "TICK",
            Self::Join => "JOIN",
            Self::Part => "PART",
            Self::Remote => "REMOTE",
            Self::Other(name) => name,
        }
    }

    /// Ticks fire constantly; callers use this to keep them out of the logs.
    pub fn is_noisy(&self) -> bool {
        matches!(self, Self::Tick)
    }
}

impl FromStr for EventCategory {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "START" => Self::Start,
            "OUTPUT" => Self::Output,
            "CMND" | "COMMAND" => Self::Command,
            "MESSAGE" => Self::Message,
            "TICK" => Self::Tick,
            "JOIN" => Self::Join,
            "PART" => Self::Part,
            "REMOTE" => Self::Remote,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        let Ok(category) = name.parse::<EventCategory>();
        Ok(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_and_other() {
        assert_eq!("cmnd".parse::<EventCategory>(), Ok(EventCategory::Command));
        assert_eq!("OUTPUT".parse::<EventCategory>(), Ok(EventCategory::Output));
        assert_eq!(
            "PRIVMSG".parse::<EventCategory>(),
            Ok(EventCategory::Other("PRIVMSG".into()))
        );
    }

    #[test]
    fn test_serde_uses_wire_name() {
        let json = serde_json::to_string(&EventCategory::Command).unwrap();
        assert_eq!(json, "\"CMND\"");
        let back: EventCategory = serde_json::from_str("\"START\"").unwrap();
        assert_eq!(back, EventCategory::Start);
    }
}
