//! Macro for implementing Display and FromStr for tag enums
//!
//! Small string-tagged enums (endpoint sources, methods) round-trip through
//! config files, env vars and health payloads. The macro gives them one
//! canonical lowercase spelling and case-insensitive parsing.
//!
//! # Example
//!
//! ```rust
//! use hearth_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Tier {
//!     Cheap,
//!     Paid,
//! }
//!
//! impl_domain_status_conversions!(Tier {
//!     Cheap => "cheap",
//!     Paid => "paid",
//! });
//!
//! assert_eq!(Tier::Paid.to_string(), "paid");
//! assert_eq!("CHEAP".parse::<Tier>(), Ok(Tier::Cheap));
//! ```

/// Implements Display and FromStr traits for tag enums
///
/// `$str` must be lowercase: parsing lowercases its input before matching.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Probe {
        Live,
        Ready,
    }

    impl_domain_status_conversions!(Probe {
        Live => "live",
        Ready => "ready",
    });

    #[test]
    fn test_display_is_lowercase() {
        assert_eq!(Probe::Live.to_string(), "live");
        assert_eq!(Probe::Ready.to_string(), "ready");
    }

    #[test]
    fn test_fromstr_ignores_case_and_whitespace() {
        assert_eq!(Probe::from_str("READY"), Ok(Probe::Ready));
        assert_eq!(Probe::from_str(" Live "), Ok(Probe::Live));
    }

    #[test]
    fn test_fromstr_invalid() {
        let err = Probe::from_str("dead").unwrap_err();
        assert_eq!(err, "Invalid Probe: dead");
    }
}
