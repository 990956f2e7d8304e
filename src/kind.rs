//! Content kind registry
//!
//! A closed enumeration of everything that can live in a pack, together with
//! the folder conventions, graph labels, server names and attribute
//! constraints that the rest of the crate derives from a kind.

use crate::paths::Companion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Enumerated category of a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(AsRefStr, Display, EnumString, EnumIter, IntoStaticStr)]
#[derive(Serialize, Deserialize)]
pub enum ContentKind {
    BaseContent,
    Classifier,
    Command,
    CommandOrScript,
    Connection,
    CorrelationRule,
    Dashboard,
    GenericDefinition,
    GenericField,
    GenericModule,
    GenericType,
    IncidentField,
    IncidentType,
    IndicatorField,
    IndicatorType,
    Integration,
    Job,
    Layout,
    List,
    Mapper,
    ModelingRule,
    Pack,
    ParsingRule,
    Playbook,
    PreProcessRule,
    Report,
    Script,
    TestPlaybook,
    Trigger,
    Widget,
    #[strum(serialize = "XSIAMDashboard")]
    #[serde(rename = "XSIAMDashboard")]
    XsiamDashboard,
    #[strum(serialize = "XSIAMReport")]
    #[serde(rename = "XSIAMReport")]
    XsiamReport,
    Wizard,
    #[strum(serialize = "XDRCTemplate")]
    #[serde(rename = "XDRCTemplate")]
    XdrcTemplate,
}

/// Label shared by every item that is not a pack or a command
pub const CONTENT_ITEM_LABEL: &str = "ContentItem";

const YAML_SUFFIXES: &[&str] = &["yml", "yaml"];
const JSON_SUFFIXES: &[&str] = &["json"];
const JSON_OR_YAML_SUFFIXES: &[&str] = &["json", "yml", "yaml"];

const ITEM_COMPANIONS: &[Companion] = &[
    Companion::Changelog,
    Companion::Readme,
    Companion::Description,
    Companion::Image,
];

const CODE_COMPANIONS: &[Companion] = &[
    Companion::Changelog,
    Companion::Readme,
    Companion::Description,
    Companion::Image,
    Companion::Code,
    Companion::UnitTest,
];

const PACK_REQUIRED: &[&str] = &[
    "name",
    "deprecated",
    "marketplaces",
    "author",
    "certification",
    "current_version",
    "categories",
];

impl ContentKind {
    /// Canonical name, e.g. `Integration`
    pub fn value(&self) -> &'static str {
        self.into()
    }

    /// Folder name inside a pack: the canonical name plus `s`
    pub fn plural_folder(&self) -> String {
        format!("{}s", self.value())
    }

    /// Folder that actually holds items of this kind on disk.
    ///
    /// Mappers share the `Classifiers` folder with classifiers.
    pub fn pack_folder(&self) -> String {
        match self {
            Self::Mapper => Self::Classifier.plural_folder(),
            _ => self.plural_folder(),
        }
    }

    /// Inverse of [`plural_folder`](Self::plural_folder): strips the trailing `s`.
    pub fn by_folder(folder: &str) -> Option<Self> {
        let singular = folder.strip_suffix('s')?;
        Self::from_str(singular).ok()
    }

    /// Graph labels, in insertion order, without duplicates
    pub fn labels(&self) -> Vec<&'static str> {
        let mut labels = vec![Self::BaseContent.value()];
        let mut push = |label: &'static str| {
            if !labels.contains(&label) {
                labels.push(label);
            }
        };
        push(self.value());
        if !matches!(self, Self::Pack | Self::Command) {
            push(CONTENT_ITEM_LABEL);
        }
        match self {
            Self::Script => {
                push(Self::Command.value());
                push(Self::CommandOrScript.value());
            }
            Self::Command => push(Self::CommandOrScript.value()),
            Self::TestPlaybook => push(Self::Playbook.value()),
            _ => {}
        }
        labels
    }

    /// Name the server uses for this kind, also the base of the file prefix
    pub fn server_name(&self) -> String {
        match self {
            Self::Script => "automation".to_string(),
            Self::IndicatorType => "reputation".to_string(),
            Self::IndicatorField => "incidentfield-indicatorfield".to_string(),
            Self::Layout => "layoutscontainer".to_string(),
            Self::PreProcessRule => "pre-process-rule".to_string(),
            Self::TestPlaybook => Self::Playbook.server_name(),
            _ => self.value().to_lowercase(),
        }
    }

    /// Prefix prepended to output file names when dumping a pack
    pub fn file_prefix(&self) -> String {
        format!("{}-", self.server_name())
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::BaseContent | Self::CommandOrScript)
    }

    /// Packs and commands are not stored as standalone item files
    pub fn is_content_item(&self) -> bool {
        !self.is_abstract() && !matches!(self, Self::Pack | Self::Command)
    }

    /// Items whose primary file references an adjacent script
    pub fn is_code_bearing(&self) -> bool {
        matches!(self, Self::Integration | Self::Script)
    }

    /// Accepted suffixes of the primary file, without the dot
    pub fn primary_suffixes(&self) -> &'static [&'static str] {
        match self {
            Self::Integration
            | Self::Script
            | Self::Playbook
            | Self::TestPlaybook
            | Self::ModelingRule
            | Self::ParsingRule
            | Self::CorrelationRule => YAML_SUFFIXES,
            Self::XdrcTemplate => JSON_OR_YAML_SUFFIXES,
            _ => JSON_SUFFIXES,
        }
    }

    /// Companion files looked up for items of this kind
    pub fn companions(&self) -> &'static [Companion] {
        if self.is_code_bearing() {
            CODE_COMPANIONS
        } else {
            ITEM_COMPANIONS
        }
    }

    /// Every kind that can appear as a file inside a pack folder
    pub fn content_items() -> impl Iterator<Item = Self> {
        Self::iter().filter(Self::is_content_item)
    }

    /// Infer the kind from the folders enclosing `path`.
    ///
    /// Looks at the parent and grandparent directory names so that both
    /// `Playbooks/foo.yml` and `Integrations/Foo/Foo.yml` resolve.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.ancestors()
            .skip(1)
            .take(2)
            .filter_map(|dir| dir.file_name()?.to_str())
            .filter_map(Self::by_folder)
            .find(Self::is_content_item)
    }
}

/// Attributes that must be unique across items of a kind
pub fn uniqueness_constraints() -> BTreeMap<ContentKind, Vec<&'static str>> {
    let mut constraints = BTreeMap::new();
    constraints.insert(ContentKind::Pack, vec!["id"]);
    for kind in ContentKind::content_items() {
        constraints.insert(kind, vec!["id", "fromversion"]);
    }
    constraints
}

/// Attributes that must be present on items of a kind
pub fn existence_constraints() -> BTreeMap<ContentKind, Vec<&'static str>> {
    let mut constraints = BTreeMap::new();
    constraints.insert(ContentKind::Pack, PACK_REQUIRED.to_vec());
    for kind in ContentKind::content_items() {
        let required = if kind.is_code_bearing() {
            vec!["id", "name"]
        } else {
            vec!["id"]
        };
        constraints.insert(kind, required);
    }
    constraints
}
