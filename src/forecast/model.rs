//! Describes which numerical weather prediction product a [`crate::ForecastClient`] talks to.
//!
//! AROME and ARPEGE expose the same WCS operations; they only differ by base URL,
//! entry-point naming, and which precision/territory pairs exist. A
//! [`ModelConfig`] captures that difference so one client handles both.

use crate::forecast::error::ForecastError;
use std::fmt;
use std::str::FromStr;

pub const API_BASE_URL: &str = "https://public-api.meteofrance.fr/public";
pub const MODEL_API_VERSION: &str = "1.0";
pub const WCS_VERSION: &str = "2.0.1";

/// The forecast model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    /// High-resolution limited-area model (France and overseas territories).
    Arome,
    /// Global model, also served on European/Atlantic sub-domains.
    Arpege,
}

impl Model {
    pub(crate) fn path_segment(&self) -> &'static str {
        match self {
            Model::Arome => "arome",
            Model::Arpege => "arpege",
        }
    }

    fn entry_point_prefix(&self) -> &'static str {
        match self {
            Model::Arome => "MF-NWP-HIGHRES-AROME",
            Model::Arpege => "MF-NWP-GLOBAL-ARPEGE",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path_segment())
    }
}

/// Grid resolution in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    /// 0.01°
    P001,
    /// 0.025°
    P0025,
    /// 0.05°
    P005,
    /// 0.1°
    P01,
    /// 0.25°
    P025,
}

impl Precision {
    /// The form used inside entry-point names, e.g. `0025` for 0.025°.
    pub fn code(&self) -> &'static str {
        match self {
            Precision::P001 => "001",
            Precision::P0025 => "0025",
            Precision::P005 => "005",
            Precision::P01 => "01",
            Precision::P025 => "025",
        }
    }

    pub fn degrees(&self) -> f64 {
        match self {
            Precision::P001 => 0.01,
            Precision::P0025 => 0.025,
            Precision::P005 => 0.05,
            Precision::P01 => 0.1,
            Precision::P025 => 0.25,
        }
    }

    /// ```
    /// use meteofrance::Precision;
    ///
    /// assert_eq!(Precision::from_degrees(0.025), Some(Precision::P0025));
    /// assert_eq!(Precision::from_degrees(0.5), None);
    /// ```
    pub fn from_degrees(degrees: f64) -> Option<Self> {
        [
            Precision::P001,
            Precision::P0025,
            Precision::P005,
            Precision::P01,
            Precision::P025,
        ]
        .into_iter()
        .find(|p| (p.degrees() - degrees).abs() < 1e-9)
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Geographic domain of a model run, named by its API code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Territory {
    France,
    /// New Caledonia
    Ncaled,
    /// Indian Ocean (La Réunion, Mayotte)
    Indien,
    /// French Polynesia
    Polyn,
    /// French Guiana
    Guyane,
    /// French West Indies
    Antil,
    Europe,
    Globe,
    Atourx,
    Eurat,
}

pub const AROME_TERRITORIES: [Territory; 6] = [
    Territory::France,
    Territory::Ncaled,
    Territory::Indien,
    Territory::Polyn,
    Territory::Guyane,
    Territory::Antil,
];

pub const ARPEGE_TERRITORIES: [Territory; 4] = [
    Territory::Europe,
    Territory::Globe,
    Territory::Atourx,
    Territory::Eurat,
];

impl Territory {
    pub fn code(&self) -> &'static str {
        match self {
            Territory::France => "FRANCE",
            Territory::Ncaled => "NCALED",
            Territory::Indien => "INDIEN",
            Territory::Polyn => "POLYN",
            Territory::Guyane => "GUYANE",
            Territory::Antil => "ANTIL",
            Territory::Europe => "EUROPE",
            Territory::Globe => "GLOBE",
            Territory::Atourx => "ATOURX",
            Territory::Eurat => "EURAT",
        }
    }

    /// ARPEGE serves each domain at a single resolution.
    fn arpege_precision(&self) -> Option<Precision> {
        match self {
            Territory::Europe => Some(Precision::P01),
            Territory::Globe => Some(Precision::P025),
            Territory::Atourx => Some(Precision::P01),
            Territory::Eurat => Some(Precision::P005),
            _ => None,
        }
    }
}

impl fmt::Display for Territory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Territory {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AROME_TERRITORIES
            .iter()
            .chain(ARPEGE_TERRITORIES.iter())
            .find(|t| t.code().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| ForecastError::UnknownTerritory(s.to_string()))
    }
}

/// A valid (model, precision, territory) triple.
///
/// ```
/// use meteofrance::{ModelConfig, Precision, Territory};
///
/// let arome = ModelConfig::arome(Precision::P0025, Territory::Antil)?;
/// assert_eq!(arome.entry_point(), "wcs/MF-NWP-HIGHRES-AROME-0025-ANTIL-WCS");
///
/// let arpege = ModelConfig::arpege(Territory::Globe)?;
/// assert_eq!(arpege.precision(), Precision::P025);
/// # Ok::<(), meteofrance::ForecastError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelConfig {
    model: Model,
    precision: Precision,
    territory: Territory,
}

impl ModelConfig {
    pub fn arome(precision: Precision, territory: Territory) -> Result<Self, ForecastError> {
        if !matches!(precision, Precision::P001 | Precision::P0025) {
            return Err(ForecastError::InvalidModelConfig(format!(
                "AROME precision must be 0.01 or 0.025, got {}",
                precision.degrees()
            )));
        }
        if !AROME_TERRITORIES.contains(&territory) {
            return Err(ForecastError::InvalidModelConfig(format!(
                "AROME territory must be one of {:?}, got {}",
                AROME_TERRITORIES.map(|t| t.code()),
                territory
            )));
        }
        Ok(Self {
            model: Model::Arome,
            precision,
            territory,
        })
    }

    /// The precision follows from the territory.
    pub fn arpege(territory: Territory) -> Result<Self, ForecastError> {
        let precision = territory.arpege_precision().ok_or_else(|| {
            ForecastError::InvalidModelConfig(format!(
                "ARPEGE territory must be one of {:?}, got {}",
                ARPEGE_TERRITORIES.map(|t| t.code()),
                territory
            ))
        })?;
        Ok(Self {
            model: Model::Arpege,
            precision,
            territory,
        })
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn territory(&self) -> Territory {
        self.territory
    }

    pub fn base_url(&self) -> String {
        format!(
            "{}/{}/{}",
            API_BASE_URL,
            self.model.path_segment(),
            MODEL_API_VERSION
        )
    }

    pub fn entry_point(&self) -> String {
        format!(
            "wcs/{}-{}-{}-WCS",
            self.model.entry_point_prefix(),
            self.precision.code(),
            self.territory.code()
        )
    }

    pub(crate) fn operation_url(&self, operation: &str) -> String {
        format!("{}/{}/{}", self.base_url(), self.entry_point(), operation)
    }
}

/// AROME 0.01° over metropolitan France.
impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: Model::Arome,
            precision: Precision::P001,
            territory: Territory::France,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arome_urls() {
        let config = ModelConfig::default();
        assert_eq!(
            config.base_url(),
            "https://public-api.meteofrance.fr/public/arome/1.0"
        );
        assert_eq!(
            config.operation_url("GetCapabilities"),
            "https://public-api.meteofrance.fr/public/arome/1.0/wcs/MF-NWP-HIGHRES-AROME-001-FRANCE-WCS/GetCapabilities"
        );
    }

    #[test]
    fn arpege_precision_follows_territory() {
        let expected = [
            (Territory::Europe, "01"),
            (Territory::Globe, "025"),
            (Territory::Atourx, "01"),
            (Territory::Eurat, "005"),
        ];
        for (territory, code) in expected {
            let config = ModelConfig::arpege(territory).unwrap();
            assert_eq!(config.model(), Model::Arpege);
            assert_eq!(
                config.entry_point(),
                format!("wcs/MF-NWP-GLOBAL-ARPEGE-{code}-{territory}-WCS")
            );
        }
        assert_eq!(
            ModelConfig::arpege(Territory::Europe).unwrap().base_url(),
            "https://public-api.meteofrance.fr/public/arpege/1.0"
        );
    }

    #[test]
    fn invalid_combinations_are_rejected() {
        assert!(matches!(
            ModelConfig::arome(Precision::P01, Territory::France),
            Err(ForecastError::InvalidModelConfig(_))
        ));
        assert!(matches!(
            ModelConfig::arome(Precision::P001, Territory::Globe),
            Err(ForecastError::InvalidModelConfig(_))
        ));
        assert!(matches!(
            ModelConfig::arpege(Territory::Antil),
            Err(ForecastError::InvalidModelConfig(_))
        ));
    }

    #[test]
    fn territory_parsing() {
        assert_eq!("antil".parse::<Territory>().unwrap(), Territory::Antil);
        assert_eq!(" EURAT ".parse::<Territory>().unwrap(), Territory::Eurat);
        assert!(matches!(
            "MARS".parse::<Territory>(),
            Err(ForecastError::UnknownTerritory(_))
        ));
    }
}
