//! The user context collected once per session.
//!
//! Every field has the same default the intake form offers, so a
//! session can start from `UserContext::default()` and override only what the
//! user actually typed. The context is plain data: it is serialisable to JSON
//! for `--context` files and is passed by reference into prompt builders.

use crate::error::ResearchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Kind of document the user wants to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputType {
    Memo,
    #[default]
    Report,
    #[serde(rename = "Policy Brief")]
    PolicyBrief,
    #[serde(rename = "Landscape Analysis")]
    LandscapeAnalysis,
    #[serde(rename = "Research Paper")]
    ResearchPaper,
    Other,
}

impl OutputType {
    pub const ALL: [OutputType; 6] = [
        OutputType::Memo,
        OutputType::Report,
        OutputType::PolicyBrief,
        OutputType::LandscapeAnalysis,
        OutputType::ResearchPaper,
        OutputType::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            OutputType::Memo => "Memo",
            OutputType::Report => "Report",
            OutputType::PolicyBrief => "Policy Brief",
            OutputType::LandscapeAnalysis => "Landscape Analysis",
            OutputType::ResearchPaper => "Research Paper",
            OutputType::Other => "Other",
        }
    }
}

/// Sector the research focuses on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Sector {
    #[serde(rename = "Carbon Markets")]
    CarbonMarkets,
    #[default]
    #[serde(rename = "Renewable Energy")]
    RenewableEnergy,
    #[serde(rename = "Sustainable Agriculture")]
    SustainableAgriculture,
    #[serde(rename = "Climate Finance")]
    ClimateFinance,
    Biodiversity,
    Other,
}

impl Sector {
    pub const ALL: [Sector; 6] = [
        Sector::CarbonMarkets,
        Sector::RenewableEnergy,
        Sector::SustainableAgriculture,
        Sector::ClimateFinance,
        Sector::Biodiversity,
        Sector::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Sector::CarbonMarkets => "Carbon Markets",
            Sector::RenewableEnergy => "Renewable Energy",
            Sector::SustainableAgriculture => "Sustainable Agriculture",
            Sector::ClimateFinance => "Climate Finance",
            Sector::Biodiversity => "Biodiversity",
            Sector::Other => "Other",
        }
    }

    /// Topic suggested when the user has not typed one.
    pub fn default_topic(self) -> String {
        format!("Impact of {} on local ecosystems", self.label().to_lowercase())
    }
}

macro_rules! label_enum_impls {
    ($ty:ident, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $ty {
            type Err = ResearchError;

            /// Case-insensitive; spaces, dashes, and underscores are interchangeable.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let norm = |v: &str| {
                    v.chars()
                        .filter(|c| !matches!(c, ' ' | '-' | '_'))
                        .collect::<String>()
                        .to_lowercase()
                };
                let wanted = norm(s);
                $ty::ALL
                    .into_iter()
                    .find(|v| norm(v.label()) == wanted)
                    .ok_or_else(|| {
                        let options: Vec<_> = $ty::ALL.iter().map(|v| v.label()).collect();
                        ResearchError::InvalidConfig(format!(
                            "unknown {} '{}', expected one of: {}",
                            $what,
                            s,
                            options.join(", ")
                        ))
                    })
            }
        }
    };
}

label_enum_impls!(OutputType, "output type");
label_enum_impls!(Sector, "sector");

/// Everything the user tells us about themselves and the report they need.
///
/// When a JSON context omits `topic_of_interest` (or leaves it blank), the
/// topic is derived from `sector_of_interest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ContextFile")]
pub struct UserContext {
    /// e.g. Policy Analyst, Sustainability Consultant, Due Diligence Expert.
    pub user_job: String,
    /// Description of the organisation's role (not its name).
    pub user_workplace: String,
    pub report_audience: String,
    pub report_inspiration: String,
    pub sources_focus_search: String,
    pub sources_date_focus_search: String,
    pub desired_output_type: OutputType,
    pub sector_of_interest: Sector,
    pub topic_of_interest: String,
    /// What the user already knows (under 200 words).
    pub existing_knowledge: String,
    /// What the user wants to learn (under 200 words).
    pub knowledge_gaps: String,
}

impl Default for UserContext {
    fn default() -> Self {
        let sector = Sector::default();
        Self {
            user_job: "Policy Analyst".into(),
            user_workplace: "A global NGO focused on environmental advocacy".into(),
            report_audience: "Internal stakeholders".into(),
            report_inspiration: "IPCC Assessment Reports".into(),
            sources_focus_search: "Multilateral Sources (IMF, ADB, World Bank, GGGI), Government Reports, Central Bank Reports".into(),
            sources_date_focus_search: "2020-2024".into(),
            desired_output_type: OutputType::default(),
            sector_of_interest: sector,
            topic_of_interest: sector.default_topic(),
            existing_knowledge: "N/A".into(),
            knowledge_gaps: "N/A".into(),
        }
    }
}

/// On-disk shape of [`UserContext`]: the topic is optional until the sector
/// is known.
#[derive(Deserialize)]
#[serde(default)]
struct ContextFile {
    user_job: String,
    user_workplace: String,
    report_audience: String,
    report_inspiration: String,
    sources_focus_search: String,
    sources_date_focus_search: String,
    desired_output_type: OutputType,
    sector_of_interest: Sector,
    topic_of_interest: Option<String>,
    existing_knowledge: String,
    knowledge_gaps: String,
}

impl Default for ContextFile {
    fn default() -> Self {
        let d = UserContext::default();
        Self {
            user_job: d.user_job,
            user_workplace: d.user_workplace,
            report_audience: d.report_audience,
            report_inspiration: d.report_inspiration,
            sources_focus_search: d.sources_focus_search,
            sources_date_focus_search: d.sources_date_focus_search,
            desired_output_type: d.desired_output_type,
            sector_of_interest: d.sector_of_interest,
            topic_of_interest: None,
            existing_knowledge: d.existing_knowledge,
            knowledge_gaps: d.knowledge_gaps,
        }
    }
}

impl From<ContextFile> for UserContext {
    fn from(f: ContextFile) -> Self {
        let sector = f.sector_of_interest;
        Self {
            user_job: f.user_job,
            user_workplace: f.user_workplace,
            report_audience: f.report_audience,
            report_inspiration: f.report_inspiration,
            sources_focus_search: f.sources_focus_search,
            sources_date_focus_search: f.sources_date_focus_search,
            desired_output_type: f.desired_output_type,
            sector_of_interest: sector,
            topic_of_interest: f
                .topic_of_interest
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| sector.default_topic()),
            existing_knowledge: f.existing_knowledge,
            knowledge_gaps: f.knowledge_gaps,
        }
    }
}

impl UserContext {
    /// Change the sector; a topic still at the old sector's default follows it.
    pub fn set_sector(&mut self, sector: Sector) {
        if self.topic_of_interest == self.sector_of_interest.default_topic() {
            self.topic_of_interest = sector.default_topic();
        }
        self.sector_of_interest = sector;
    }

    /// Default context for a given sector, with the topic derived from it.
    pub fn for_sector(sector: Sector) -> Self {
        Self {
            sector_of_interest: sector,
            topic_of_interest: sector.default_topic(),
            ..Self::default()
        }
    }

    /// Load a context from a JSON file; missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ResearchError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ResearchError::LoadFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ResearchError::LoadFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Field name / value pairs in form order, for prompts and display.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("user_job", self.user_job.clone()),
            ("user_workplace", self.user_workplace.clone()),
            ("report_audience", self.report_audience.clone()),
            ("report_inspiration", self.report_inspiration.clone()),
            ("sources_focus_search", self.sources_focus_search.clone()),
            ("sources_date_focus_search", self.sources_date_focus_search.clone()),
            ("desired_output_type", self.desired_output_type.to_string()),
            ("sector_of_interest", self.sector_of_interest.to_string()),
            ("topic_of_interest", self.topic_of_interest.clone()),
            ("existing_knowledge", self.existing_knowledge.clone()),
            ("knowledge_gaps", self.knowledge_gaps.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_intake_form() {
        let c = UserContext::default();
        assert_eq!(c.user_job, "Policy Analyst");
        assert_eq!(c.desired_output_type, OutputType::Report);
        assert_eq!(c.sector_of_interest, Sector::RenewableEnergy);
        assert_eq!(
            c.topic_of_interest,
            "Impact of renewable energy on local ecosystems"
        );
        assert_eq!(c.sources_date_focus_search, "2020-2024");
    }

    #[test]
    fn topic_follows_sector() {
        let c = UserContext::for_sector(Sector::CarbonMarkets);
        assert_eq!(c.topic_of_interest, "Impact of carbon markets on local ecosystems");
    }

    #[test]
    fn enums_parse_leniently() {
        assert_eq!("policy brief".parse::<OutputType>().unwrap(), OutputType::PolicyBrief);
        assert_eq!("POLICY-BRIEF".parse::<OutputType>().unwrap(), OutputType::PolicyBrief);
        assert_eq!("climate_finance".parse::<Sector>().unwrap(), Sector::ClimateFinance);
        let err = "podcast".parse::<OutputType>().unwrap_err();
        assert!(err.to_string().contains("Memo"));
    }

    #[test]
    fn json_uses_form_labels_and_fills_defaults() {
        let c: UserContext = serde_json::from_str(
            r#"{"desired_output_type": "Policy Brief", "sector_of_interest": "Biodiversity"}"#,
        )
        .unwrap();
        assert_eq!(c.desired_output_type, OutputType::PolicyBrief);
        assert_eq!(c.sector_of_interest, Sector::Biodiversity);
        assert_eq!(c.user_job, "Policy Analyst");
    }

    #[test]
    fn json_without_topic_derives_it_from_sector() {
        let c: UserContext =
            serde_json::from_str(r#"{"sector_of_interest": "Biodiversity"}"#).unwrap();
        assert_eq!(c.topic_of_interest, Sector::Biodiversity.default_topic());

        let blank: UserContext = serde_json::from_str(
            r#"{"sector_of_interest": "Carbon Markets", "topic_of_interest": "  "}"#,
        )
        .unwrap();
        assert_eq!(blank.topic_of_interest, Sector::CarbonMarkets.default_topic());
    }

    #[test]
    fn json_keeps_an_explicit_topic() {
        let c: UserContext = serde_json::from_str(
            r#"{"sector_of_interest": "Biodiversity", "topic_of_interest": "Mangrove finance"}"#,
        )
        .unwrap();
        assert_eq!(c.topic_of_interest, "Mangrove finance");
    }

    #[test]
    fn json_round_trips_through_the_file_shape() {
        let c = UserContext::for_sector(Sector::ClimateFinance);
        let back: UserContext = serde_json::from_str(&serde_json::to_string(&c).unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn set_sector_moves_a_default_topic_only() {
        let mut c = UserContext::default();
        c.set_sector(Sector::Biodiversity);
        assert_eq!(c.topic_of_interest, Sector::Biodiversity.default_topic());

        c.topic_of_interest = "Seagrass restoration".into();
        c.set_sector(Sector::ClimateFinance);
        assert_eq!(c.sector_of_interest, Sector::ClimateFinance);
        assert_eq!(c.topic_of_interest, "Seagrass restoration");
    }

    #[test]
    fn load_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctx.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = UserContext::load(&path).unwrap_err();
        assert!(err.to_string().contains("ctx.json"));
    }

    #[test]
    fn fields_are_in_form_order() {
        let fields = UserContext::default().fields();
        assert_eq!(fields.len(), 11);
        assert_eq!(fields[0].0, "user_job");
        assert_eq!(fields[10].0, "knowledge_gaps");
    }
}
