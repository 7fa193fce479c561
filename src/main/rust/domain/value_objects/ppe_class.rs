use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Protective equipment classes the detection model is trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PpeClass {
    Helmet,
    Jacket,
    Gloves,
    Mask,
    Eyewear,
    Boots,
    Shield,
}

impl PpeClass {
    pub const ALL: [PpeClass; 7] = [
        Self::Helmet,
        Self::Jacket,
        Self::Gloves,
        Self::Mask,
        Self::Eyewear,
        Self::Boots,
        Self::Shield,
    ];

    /// Label used by the backend in `classLabel`
    pub fn label(&self) -> &'static str {
        match self {
            Self::Helmet => "helmet",
            Self::Jacket => "jacket",
            Self::Gloves => "gloves",
            Self::Mask => "mask",
            Self::Eyewear => "eyewear",
            Self::Boots => "boots",
            Self::Shield => "shield",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Helmet => "Protective Helmet",
            Self::Jacket => "Safety Jacket",
            Self::Gloves => "Protective Gloves",
            Self::Mask => "Dust Mask",
            Self::Eyewear => "Eye Wear",
            Self::Boots => "Safety Boots",
            Self::Shield => "Shield",
        }
    }

    /// Labels of the full catalogue
    pub fn all_labels() -> BTreeSet<String> {
        Self::ALL.iter().map(|c| c.label().to_string()).collect()
    }
}

impl fmt::Display for PpeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PpeClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown PPE class: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_has_seven_classes() {
        assert_eq!(PpeClass::all_labels().len(), 7);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Helmet".parse::<PpeClass>(), Ok(PpeClass::Helmet));
        assert_eq!(" EYEWEAR ".parse::<PpeClass>(), Ok(PpeClass::Eyewear));
        assert!("visor".parse::<PpeClass>().is_err());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(PpeClass::Mask.display_name(), "Dust Mask");
        assert_eq!(PpeClass::Boots.to_string(), "boots");
    }
}
