//! Open tagged sets for entity and warning types.
//!
//! Detectors and the surrounding application introduce new type tags without a
//! schema change, so each set has known variants plus an `Other` fallback that
//! round-trips the original tag verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! open_tag_set {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $tag:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            /// A tag this build does not know about
            Other(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $($name::$variant => $tag,)+
                    $name::Other(tag) => tag,
                }
            }

            pub fn is_known(&self) -> bool {
                !matches!(self, $name::Other(_))
            }
        }

        impl From<String> for $name {
            fn from(tag: String) -> Self {
                match tag.as_str() {
                    $($tag => $name::$variant,)+
                    _ => $name::Other(tag),
                }
            }
        }

        impl From<&str> for $name {
            fn from(tag: &str) -> Self {
                Self::from(tag.to_string())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

open_tag_set!(
    /// Kind of narrative entity whose evolution is tracked
    EntityType {
        Character => "CHARACTER",
        WikiEntry => "WIKI_ENTRY",
        PlotThread => "PLOT_THREAD",
        Chapter => "CHAPTER",
    }
);

open_tag_set!(
    /// Kind of inconsistency reported by a detector
    WarningType {
        NameConflict => "NAME_CONFLICT",
        MissingField => "MISSING_FIELD",
        RelationshipInconsistency => "RELATIONSHIP_INCONSISTENCY",
        TimelineConflict => "TIMELINE_CONFLICT",
        PlotHole => "PLOT_HOLE",
        CharacterInconsistency => "CHARACTER_INCONSISTENCY",
    }
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tag_parses_to_variant() {
        assert_eq!(WarningType::from("PLOT_HOLE"), WarningType::PlotHole);
        assert_eq!(EntityType::from("CHARACTER"), EntityType::Character);
    }

    #[test]
    fn test_unknown_tag_round_trips() {
        let t = WarningType::from("STYLE_DRIFT");
        assert_eq!(t, WarningType::Other("STYLE_DRIFT".to_string()));
        assert!(!t.is_known());
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"STYLE_DRIFT\"");
        let back: WarningType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_known_tag_serializes_as_plain_string() {
        let json = serde_json::to_string(&EntityType::WikiEntry).unwrap();
        assert_eq!(json, "\"WIKI_ENTRY\"");
    }
}
