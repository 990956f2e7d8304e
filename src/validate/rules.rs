//! Built-in validators

use super::{ValidationResult, Validator};
use crate::document::DocumentFormat;
use crate::error::{ContentError, Result};
use crate::git::GitStatus;
use crate::item::ContentItem;
use crate::kind::{existence_constraints, ContentKind};
use crate::version::ContentVersion;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// `fromversion` assumed when an item declares none
const DEFAULT_FROM_VERSION: &str = "0.0.0";

/// Every built-in validator
pub fn all() -> Vec<Box<dyn Validator>> {
    vec![
        Box::new(GenericFieldIdPrefix),
        Box::new(XdrcTemplateFileName),
        Box::new(FromVersionSufficient),
        Box::new(TrailingSpaces),
        Box::new(DescriptionEndsWithDot),
        Box::new(PackMetadataFields),
    ]
}

/// GF101: generic field ids start with `generic_`
pub struct GenericFieldIdPrefix;

impl Validator for GenericFieldIdPrefix {
    fn error_code(&self) -> &'static str {
        "GF101"
    }

    fn description(&self) -> &'static str {
        "Checks that a generic field id starts with generic_"
    }

    fn rationale(&self) -> &'static str {
        "Generic field ids share a namespace that the server reserves by prefix"
    }

    fn error_message(&self) -> &'static str {
        "{0} is not a valid id, it should start with generic_."
    }

    fn related_field(&self) -> &'static str {
        "id"
    }

    fn kinds(&self) -> Vec<ContentKind> {
        vec![ContentKind::GenericField]
    }

    fn obtain_invalid(&self, items: &[&ContentItem]) -> Result<Vec<ValidationResult>> {
        let mut results = Vec::new();
        for item in items {
            let id = item.id()?.unwrap_or_default();
            if !id.starts_with("generic_") {
                results.push(self.invalid(item, self.error_message().replace("{0}", id)));
            }
        }
        Ok(results)
    }
}

/// XT100: XDRC template files are named `<pack>_<name>`
pub struct XdrcTemplateFileName;

impl Validator for XdrcTemplateFileName {
    fn error_code(&self) -> &'static str {
        "XT100"
    }

    fn description(&self) -> &'static str {
        "Checks the naming convention of XDRC template files"
    }

    fn rationale(&self) -> &'static str {
        "Template files from different packs are deployed side by side and must not collide"
    }

    fn error_message(&self) -> &'static str {
        "The XDRC template file name {0} is invalid, it should start with the pack name followed by an underscore: {1}_"
    }

    fn kinds(&self) -> Vec<ContentKind> {
        vec![ContentKind::XdrcTemplate]
    }

    fn obtain_invalid(&self, items: &[&ContentItem]) -> Result<Vec<ValidationResult>> {
        let mut results = Vec::new();
        for item in items {
            let Some(pack) = item.pack_name() else {
                continue;
            };
            let file_name = item
                .path()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !file_name.starts_with(&format!("{pack}_")) {
                let message = self
                    .error_message()
                    .replace("{0}", &file_name)
                    .replace("{1}", &pack);
                results.push(self.invalid(item, message));
            }
        }
        Ok(results)
    }
}

/// Lowest `fromversion` the server accepts per kind
pub fn minimum_from_version(kind: ContentKind) -> Option<&'static str> {
    use ContentKind::*;
    let version = match kind {
        IncidentField | IndicatorField | Script | Playbook | Report | Widget | Dashboard
        | IncidentType => "5.0.0",
        Layout | Mapper | Classifier => "6.0.0",
        GenericDefinition | GenericModule | GenericField | GenericType | List => "6.5.0",
        Wizard | Job | PreProcessRule => "6.8.0",
        XsiamReport | CorrelationRule | ParsingRule | XsiamDashboard => "6.10.0",
        _ => return None,
    };
    Some(version)
}

/// Key holding `fromversion` in `item`, following the file's own spelling
fn from_version_key(item: &ContentItem) -> Result<&'static str> {
    for key in ["fromversion", "fromVersion"] {
        if item.get(key)?.is_some() {
            return Ok(key);
        }
    }
    Ok(match item.document().format() {
        DocumentFormat::Json => "fromVersion",
        DocumentFormat::Yaml => "fromversion",
    })
}

/// BA106: `fromversion` meets the minimum for the item's kind
pub struct FromVersionSufficient;

impl Validator for FromVersionSufficient {
    fn error_code(&self) -> &'static str {
        "BA106"
    }

    fn description(&self) -> &'static str {
        "Validate that the item's fromversion field is sufficient."
    }

    fn rationale(&self) -> &'static str {
        "Older servers cannot install content types introduced after them"
    }

    fn error_message(&self) -> &'static str {
        "The {0} from version field is either missing or insufficient, need at least {1}, current is {2}."
    }

    fn related_field(&self) -> &'static str {
        "fromversion"
    }

    fn kinds(&self) -> Vec<ContentKind> {
        use ContentKind::*;
        vec![
            GenericDefinition,
            GenericField,
            GenericModule,
            GenericType,
            List,
            Mapper,
            Classifier,
            Widget,
            Dashboard,
            IncidentType,
            Script,
            Playbook,
            Report,
            Wizard,
            Job,
            Layout,
            PreProcessRule,
            CorrelationRule,
            ParsingRule,
            XsiamDashboard,
            XsiamReport,
            IncidentField,
        ]
    }

    fn is_auto_fixable(&self) -> bool {
        true
    }

    fn obtain_invalid(&self, items: &[&ContentItem]) -> Result<Vec<ValidationResult>> {
        let mut results = Vec::new();
        for item in items {
            let Some(minimum) = minimum_from_version(item.kind()) else {
                continue;
            };
            let current = match item.get(from_version_key(item)?)? {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => DEFAULT_FROM_VERSION.to_string(),
            };
            if ContentVersion::parse(&current)? < ContentVersion::parse(minimum)? {
                let message = self
                    .error_message()
                    .replace("{0}", &item.kind().to_string())
                    .replace("{1}", minimum)
                    .replace("{2}", &current);
                results.push(self.invalid(item, message));
            }
        }
        Ok(results)
    }

    fn fix(&self, item: &mut ContentItem) -> Result<String> {
        let Some(minimum) = minimum_from_version(item.kind()) else {
            return Err(ContentError::Usage(format!(
                "no minimum fromversion for {}",
                item.kind()
            )));
        };
        let key = from_version_key(item)?;
        item.set(key, minimum)?;
        Ok(format!("Raised the fromversion field to {minimum}"))
    }
}

/// BA113: `id` and `name` carry no trailing whitespace
pub struct TrailingSpaces;

impl TrailingSpaces {
    /// Offending fields of `item` as (reported name, key path)
    fn offending(item: &ContentItem) -> Result<Vec<(&'static str, Vec<&'static str>)>> {
        let id_path: Vec<&'static str> = if item.document().get_path(&["commonfields", "id"])?.is_some() {
            vec!["commonfields", "id"]
        } else {
            vec!["id"]
        };
        let mut found = Vec::new();
        for (field, path) in [("object_id", id_path), ("name", vec!["name"])] {
            if let Some(Value::String(value)) = item.document().get_path(&path)? {
                if value.trim_end() != value {
                    found.push((field, path));
                }
            }
        }
        Ok(found)
    }
}

impl Validator for TrailingSpaces {
    fn error_code(&self) -> &'static str {
        "BA113"
    }

    fn description(&self) -> &'static str {
        "Checks for content item names with trailing spaces."
    }

    fn rationale(&self) -> &'static str {
        "Ensures accurate referencing."
    }

    fn error_message(&self) -> &'static str {
        "The following fields have a trailing spaces: {0}."
    }

    fn related_field(&self) -> &'static str {
        "name, commonfields.id"
    }

    fn kinds(&self) -> Vec<ContentKind> {
        use ContentKind::*;
        vec![
            Classifier,
            CorrelationRule,
            Dashboard,
            GenericDefinition,
            GenericField,
            GenericModule,
            GenericType,
            IncidentType,
            IndicatorField,
            Integration,
            Layout,
            Mapper,
            ModelingRule,
            ParsingRule,
            Playbook,
            Report,
            Script,
            TestPlaybook,
            Trigger,
            Widget,
            Wizard,
            XsiamDashboard,
            XsiamReport,
        ]
    }

    fn is_auto_fixable(&self) -> bool {
        true
    }

    fn obtain_invalid(&self, items: &[&ContentItem]) -> Result<Vec<ValidationResult>> {
        let mut results = Vec::new();
        for item in items {
            let fields: Vec<&str> = Self::offending(item)?.into_iter().map(|(f, _)| f).collect();
            if !fields.is_empty() {
                results.push(self.invalid(item, self.error_message().replace("{0}", &fields.join(", "))));
            }
        }
        Ok(results)
    }

    fn fix(&self, item: &mut ContentItem) -> Result<String> {
        let mut fixed = Vec::new();
        for (field, path) in Self::offending(item)? {
            let trimmed = item
                .document()
                .get_path(&path)?
                .and_then(Value::as_str)
                .map(|v| v.trim_end().to_string())
                .unwrap_or_default();
            item.document_mut().set_path(&path, trimmed)?;
            fixed.push(field);
        }
        let name = item.name()?.unwrap_or_default().to_string();
        Ok(format!(
            "Removed trailing spaces from the {} fields of following content items: {}",
            fixed.join(", "),
            name
        ))
    }
}

/// Endings that close a sentence
const SENTENCE_SUFFIXES: &[&str] = &[".", "!", "?", ".)", ".\"", ".'", ".]"];

fn url_suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(https?://|www\.)\S+$").expect("url pattern is valid"))
}

/// Trim, then drop one pair of matching surrounding quotes
fn strip_description(description: &str) -> &str {
    let trimmed = description.trim();
    for quote in ['"', '\''] {
        if trimmed.len() > 1 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return trimmed.trim_matches(quote);
        }
    }
    trimmed
}

/// Non-empty text that neither closes a sentence nor ends with a link
fn lacks_period(description: &str) -> bool {
    let stripped = strip_description(description);
    !stripped.is_empty()
        && !SENTENCE_SUFFIXES.iter().any(|s| stripped.ends_with(s))
        && !url_suffix_regex().is_match(stripped)
}

fn description_of(entry: &Value) -> &str {
    entry.get("description").and_then(Value::as_str).unwrap_or_default()
}

/// Indexes of `entries` whose description lacks a period
fn entries_lacking_period(entries: Option<&Value>) -> Vec<usize> {
    entries
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .enumerate()
                .filter(|(_, entry)| lacks_period(description_of(entry)))
                .map(|(i, _)| i)
                .collect()
        })
        .unwrap_or_default()
}

/// Argument and output lines for one script or command
fn argument_and_output_lines(owner: &Value, args_key: &str, separator: &str) -> String {
    let mut lines = String::new();
    for i in entries_lacking_period(owner.get(args_key)) {
        let name = owner[args_key][i].get("name").and_then(Value::as_str).unwrap_or_default();
        lines.push_str(&format!("{separator}The argument {name} description should end with a period."));
    }
    for i in entries_lacking_period(owner.get("outputs")) {
        let path = owner["outputs"][i].get("contextPath").and_then(Value::as_str).unwrap_or_default();
        lines.push_str(&format!("{separator}The context path {path} description should end with a period."));
    }
    lines
}

/// Append a period to every listed entry's description
fn add_periods(owner: &mut Value, key: &str, label: &str, id_key: &str, separator: &str) -> String {
    let mut message = String::new();
    for i in entries_lacking_period(owner.get(key)) {
        let entry = &mut owner[key][i];
        let fixed = format!("{}.", description_of(entry));
        let id = entry.get(id_key).and_then(Value::as_str).unwrap_or_default().to_string();
        entry["description"] = Value::String(fixed);
        message.push_str(&format!("{separator}Added a '.' at the end of the {label} '{id}' description field."));
    }
    message
}

/// DS108: description fields end with a period
pub struct DescriptionEndsWithDot;

impl DescriptionEndsWithDot {
    /// Top-level field holding the item's description
    fn description_key(item: &ContentItem) -> &'static str {
        if item.kind() == ContentKind::Script {
            "comment"
        } else {
            "description"
        }
    }

    fn missing_lines(item: &ContentItem) -> Result<String> {
        let key = Self::description_key(item);
        let mut lines = String::new();
        if lacks_period(item.document().get_str(key)?.unwrap_or_default()) {
            lines.push_str(&format!(
                "\nThe file's {key} field is missing a '.' at the end of the sentence."
            ));
        }
        if item.kind() == ContentKind::Script {
            let script = Value::Object(item.document().to_dict()?);
            lines.push_str(&argument_and_output_lines(&script, "args", "\n"));
        } else if let Some(commands) = item.document().get_path(&["script", "commands"])?.and_then(Value::as_array) {
            for command in commands {
                let command_lines = argument_and_output_lines(command, "arguments", "\n\t");
                if !command_lines.is_empty() {
                    let name = command.get("name").and_then(Value::as_str).unwrap_or_default();
                    lines.push_str(&format!("\n- In command '{name}':{command_lines}"));
                }
            }
        }
        Ok(lines)
    }
}

impl Validator for DescriptionEndsWithDot {
    fn error_code(&self) -> &'static str {
        "DS108"
    }

    fn description(&self) -> &'static str {
        "Ensure that all yml's description fields ends with a dot."
    }

    fn rationale(&self) -> &'static str {
        "To ensure high documentation standards."
    }

    fn error_message(&self) -> &'static str {
        "The {0} contains description fields without dots at the end:{1}\nPlease make sure to add a dot at the end of all the mentioned fields."
    }

    fn related_field(&self) -> &'static str {
        "description, comment"
    }

    fn kinds(&self) -> Vec<ContentKind> {
        vec![ContentKind::Integration, ContentKind::Script]
    }

    fn expected_git_statuses(&self) -> &'static [GitStatus] {
        &[GitStatus::Modified, GitStatus::Added]
    }

    fn is_auto_fixable(&self) -> bool {
        true
    }

    fn obtain_invalid(&self, items: &[&ContentItem]) -> Result<Vec<ValidationResult>> {
        let mut results = Vec::new();
        for item in items {
            let lines = Self::missing_lines(item)?;
            if !lines.is_empty() {
                let message = self
                    .error_message()
                    .replace("{0}", &item.kind().to_string())
                    .replace("{1}", &lines);
                results.push(self.invalid(item, message));
            }
        }
        Ok(results)
    }

    fn fix(&self, item: &mut ContentItem) -> Result<String> {
        let key = Self::description_key(item);
        let mut message = String::new();

        if let Some(text) = item.document().get_str(key)? {
            if lacks_period(text) {
                let fixed = format!("{text}.");
                item.set(key, fixed)?;
                message.push_str(&format!("\nAdded a '.' at the end of the {key} field."));
            }
        }

        if item.kind() == ContentKind::Script {
            for (list, label, id_key) in [("args", "argument", "name"), ("outputs", "output", "contextPath")] {
                let Some(entries) = item.get(list)?.cloned() else {
                    continue;
                };
                let mut owner = Value::Object(Map::from_iter([(list.to_string(), entries)]));
                let added = add_periods(&mut owner, list, label, id_key, "\n");
                if !added.is_empty() {
                    item.set(list, owner[list].take())?;
                    message.push_str(&added);
                }
            }
        } else if let Some(mut script) = item.get("script")?.cloned() {
            let mut changed = false;
            if let Some(commands) = script.get_mut("commands").and_then(Value::as_array_mut) {
                for command in commands {
                    let name = command.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                    let mut command_message = add_periods(command, "arguments", "argument", "name", "\n\t");
                    command_message.push_str(&add_periods(command, "outputs", "output", "contextPath", "\n\t"));
                    if !command_message.is_empty() {
                        changed = true;
                        message.push_str(&format!("\n In the command {name}:{command_message}"));
                    }
                }
            }
            if changed {
                item.set("script", script)?;
            }
        }

        Ok(format!(
            "Added dots ('.') at the end of the following description fields:{message}"
        ))
    }
}

/// PA100: required pack metadata fields are present
pub struct PackMetadataFields;

impl Validator for PackMetadataFields {
    fn error_code(&self) -> &'static str {
        "PA100"
    }

    fn description(&self) -> &'static str {
        "Checks that pack metadata declares every required field"
    }

    fn rationale(&self) -> &'static str {
        "The marketplace cannot list a pack without its core metadata"
    }

    fn error_message(&self) -> &'static str {
        "Missing required fields in pack metadata: {0}."
    }

    fn kinds(&self) -> Vec<ContentKind> {
        vec![ContentKind::Pack]
    }

    fn obtain_invalid(&self, items: &[&ContentItem]) -> Result<Vec<ValidationResult>> {
        let constraints = existence_constraints();
        let required = constraints
            .get(&ContentKind::Pack)
            .cloned()
            .unwrap_or_default();
        let mut results = Vec::new();
        for item in items {
            let mut missing = Vec::new();
            for field in &required {
                let present = item.get(field)?.is_some() || item.get(&camel_case(field))?.is_some();
                if !present {
                    missing.push(*field);
                }
            }
            if !missing.is_empty() {
                results.push(self.invalid(item, self.error_message().replace("{0}", &missing.join(", "))));
            }
        }
        Ok(results)
    }
}

/// `current_version` -> `currentVersion`
fn camel_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper = false;
    for c in snake.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
