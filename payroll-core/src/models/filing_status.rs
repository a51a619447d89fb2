use serde::{Deserialize, Serialize};

/// Filing status used to select a bracket table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilingStatus {
    Single,
    Married,
    HeadOfHousehold,
}

impl FilingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "S",
            Self::Married => "M",
            Self::HeadOfHousehold => "HOH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "S" => Some(Self::Single),
            "M" => Some(Self::Married),
            "HOH" => Some(Self::HeadOfHousehold),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for status in [
            FilingStatus::Single,
            FilingStatus::Married,
            FilingStatus::HeadOfHousehold,
        ] {
            assert_eq!(FilingStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert_eq!(FilingStatus::parse("MFJ"), None);
    }
}
