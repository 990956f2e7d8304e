//! Validator framework
//!
//! A [`Validator`] inspects content items of the kinds it declares and
//! reports the ones that break its rule. Validators are registered in a
//! [`ValidatorRegistry`] keyed by their error code; a run over a set of items
//! produces a [`ValidationReport`].
//!
//! ## Error codes
//! Codes are two capital letters followed by three digits (`GF101`,
//! `XT100`). A validator that fails or panics is reported under
//! [`INTERNAL_ERROR_CODE`] and never stops the rest of the run.

pub mod rules;

use crate::config::ValidationConfig;
use crate::error::{ContentError, Result};
use crate::git::GitStatus;
use crate::item::ContentItem;
use crate::kind::ContentKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{debug, error, info};

/// Code of the synthetic result produced when a validator crashes
pub const INTERNAL_ERROR_CODE: &str = "INTERNAL";

/// Statuses a validator fires for unless it says otherwise
pub const DEFAULT_GIT_STATUSES: &[GitStatus] = &[
    GitStatus::Added,
    GitStatus::Modified,
    GitStatus::Renamed,
    GitStatus::Unchanged,
];

/// One finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub code: String,
    pub message: String,
    pub path: PathBuf,
    pub related_field: String,
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: [{}] - {}", self.path.display(), self.code, self.message)
    }
}

/// An inspection rule over content items
pub trait Validator: Send + Sync {
    /// Stable machine id, e.g. `GF101`
    fn error_code(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn rationale(&self) -> &'static str;

    /// Message template; `{}`-style placeholders are filled per finding
    fn error_message(&self) -> &'static str;

    /// Field the finding is about, empty when the whole item is
    fn related_field(&self) -> &'static str {
        ""
    }

    /// Kinds this validator inspects
    fn kinds(&self) -> Vec<ContentKind>;

    fn expected_git_statuses(&self) -> &'static [GitStatus] {
        DEFAULT_GIT_STATUSES
    }

    fn is_auto_fixable(&self) -> bool {
        false
    }

    /// Findings for the items that break the rule. Must not mutate.
    fn obtain_invalid(&self, items: &[&ContentItem]) -> Result<Vec<ValidationResult>>;

    /// Repair `item` in memory, returning a description of the change
    fn fix(&self, item: &mut ContentItem) -> Result<String> {
        Err(ContentError::Usage(format!(
            "{} cannot fix {}",
            self.error_code(),
            item.path().display()
        )))
    }

    /// Build a finding for `item`
    fn invalid(&self, item: &ContentItem, message: String) -> ValidationResult {
        ValidationResult {
            code: self.error_code().to_string(),
            message,
            path: item.path().to_path_buf(),
            related_field: self.related_field().to_string(),
        }
    }

    /// Whether this validator inspects `item`
    fn applies_to(&self, item: &ContentItem) -> bool {
        self.kinds().contains(&item.kind())
            && self.expected_git_statuses().contains(&item.git_status())
    }
}

/// Outcome of a validation run
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Findings that fail the run
    pub errors: Vec<ValidationResult>,
    /// Findings for codes configured as warnings
    pub warnings: Vec<ValidationResult>,
    /// Findings repaired in fix mode, with the fix description as message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixed: Vec<ValidationResult>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// All findings, errors first
    pub fn results(&self) -> impl Iterator<Item = &ValidationResult> {
        self.errors.iter().chain(self.warnings.iter())
    }

    /// JSON array of `{code, message, path, related_field}` objects
    pub fn to_json(&self) -> Result<String> {
        let results: Vec<&ValidationResult> = self.results().collect();
        serde_json::to_string_pretty(&results)
            .map_err(|e| ContentError::Internal(format!("cannot render report: {e}")))
    }

    /// One `<path>: [<code>] - <message>` line per finding
    pub fn to_readable(&self) -> String {
        self.results()
            .map(|r| format!("{r}\n"))
            .collect::<Vec<_>>()
            .concat()
    }
}

fn error_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]{2}\d{3}$").expect("error code pattern is valid"))
}

/// Validators keyed by error code
#[derive(Default)]
pub struct ValidatorRegistry {
    validators: BTreeMap<&'static str, Box<dyn Validator>>,
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("codes", &self.codes())
            .finish()
    }
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in validator
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        for validator in rules::all() {
            registry.register(validator)?;
        }
        Ok(registry)
    }

    /// Add a validator, rejecting malformed and already registered codes
    pub fn register(&mut self, validator: Box<dyn Validator>) -> Result<()> {
        let code = validator.error_code();
        if !error_code_regex().is_match(code) {
            return Err(ContentError::InvalidErrorCode(code.to_string()));
        }
        if self.validators.contains_key(code) {
            return Err(ContentError::DuplicateErrorCode(code.to_string()));
        }
        debug!(code, "Registered validator");
        self.validators.insert(code, validator);
        Ok(())
    }

    pub fn get(&self, code: &str) -> Option<&dyn Validator> {
        self.validators.get(code).map(|v| v.as_ref())
    }

    /// Registered codes in order
    pub fn codes(&self) -> Vec<&'static str> {
        self.validators.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Validators enabled by `config`, in code order
    fn selected<'a>(&'a self, config: &'a ValidationConfig) -> impl Iterator<Item = &'a dyn Validator> {
        self.validators
            .iter()
            .filter(move |(code, _)| {
                (config.select.is_empty() || config.select.iter().any(|s| s == *code))
                    && !config.ignore.iter().any(|i| i == *code)
            })
            .map(|(_, v)| v.as_ref())
    }

    /// Run every selected validator over `items`.
    ///
    /// Always returns the full set of findings; crashes become
    /// [`INTERNAL_ERROR_CODE`] findings.
    pub fn run(&self, items: &[ContentItem], config: &ValidationConfig) -> ValidationReport {
        let mut report = ValidationReport::default();
        for validator in self.selected(config) {
            let applicable: Vec<&ContentItem> =
                items.iter().filter(|item| validator.applies_to(item)).collect();
            if applicable.is_empty() {
                continue;
            }
            for result in invoke(validator, &applicable) {
                file_result(&mut report, result, config);
            }
        }
        info!(
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "Validation finished"
        );
        report
    }

    /// Like [`run`](Self::run), but auto-fixable findings are repaired in
    /// memory and reported under `fixed`. Fixed items are left dirty for the
    /// caller to write back.
    pub fn run_fix(&self, items: &mut [ContentItem], config: &ValidationConfig) -> ValidationReport {
        let mut report = ValidationReport::default();
        for validator in self.selected(config) {
            let results = {
                let applicable: Vec<&ContentItem> =
                    items.iter().filter(|item| validator.applies_to(item)).collect();
                if applicable.is_empty() {
                    continue;
                }
                invoke(validator, &applicable)
            };

            if !validator.is_auto_fixable() {
                for result in results {
                    file_result(&mut report, result, config);
                }
                continue;
            }

            for (path, group) in group_by_path(results) {
                let target = items.iter_mut().find(|item| item.path() == path);
                let own = group.iter().all(|r| r.code == validator.error_code());
                let Some(item) = target.filter(|_| own) else {
                    for result in group {
                        file_result(&mut report, result, config);
                    }
                    continue;
                };
                match validator.fix(item) {
                    Ok(message) => {
                        info!(code = validator.error_code(), path = %path.display(), "Fixed");
                        report.fixed.push(ValidationResult {
                            code: validator.error_code().to_string(),
                            message,
                            related_field: related_fields(&group),
                            path,
                        });
                    }
                    Err(e) => {
                        error!(code = validator.error_code(), error = %e, "Fix failed");
                        for result in group {
                            file_result(&mut report, result, config);
                        }
                    }
                }
            }
        }
        report
    }
}

/// Findings grouped per item, in first-seen order
fn group_by_path(results: Vec<ValidationResult>) -> Vec<(PathBuf, Vec<ValidationResult>)> {
    let mut groups: Vec<(PathBuf, Vec<ValidationResult>)> = Vec::new();
    for result in results {
        match groups.iter_mut().find(|(path, _)| *path == result.path) {
            Some((_, group)) => group.push(result),
            None => groups.push((result.path.clone(), vec![result])),
        }
    }
    groups
}

fn related_fields(group: &[ValidationResult]) -> String {
    let mut fields: Vec<&str> = Vec::new();
    for result in group {
        if !result.related_field.is_empty() && !fields.contains(&result.related_field.as_str()) {
            fields.push(&result.related_field);
        }
    }
    fields.join(", ")
}

fn file_result(report: &mut ValidationReport, result: ValidationResult, config: &ValidationConfig) {
    if config.warning.iter().any(|w| *w == result.code) {
        report.warnings.push(result);
    } else {
        report.errors.push(result);
    }
}

/// Call `obtain_invalid`, turning errors and panics into one internal finding
fn invoke(validator: &dyn Validator, items: &[&ContentItem]) -> Vec<ValidationResult> {
    let code = validator.error_code();
    let failure = match catch_unwind(AssertUnwindSafe(|| validator.obtain_invalid(items))) {
        Ok(Ok(results)) => return results,
        Ok(Err(e)) => e.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };
    error!(code, error = %failure, "Validator crashed");
    vec![ValidationResult {
        code: INTERNAL_ERROR_CODE.to_string(),
        message: format!("{code} failed: {failure}"),
        path: items.first().map(|i| i.path().to_path_buf()).unwrap_or_default(),
        related_field: String::new(),
    }]
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentOptions;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct Panicky;

    impl Validator for Panicky {
        fn error_code(&self) -> &'static str {
            "ZZ999"
        }
        fn description(&self) -> &'static str {
            "always panics"
        }
        fn rationale(&self) -> &'static str {
            "test"
        }
        fn error_message(&self) -> &'static str {
            ""
        }
        fn kinds(&self) -> Vec<ContentKind> {
            vec![ContentKind::GenericField]
        }
        fn obtain_invalid(&self, _items: &[&ContentItem]) -> Result<Vec<ValidationResult>> {
            panic!("boom")
        }
    }

    struct AddedOnly;

    impl Validator for AddedOnly {
        fn error_code(&self) -> &'static str {
            "ZZ100"
        }
        fn description(&self) -> &'static str {
            "flags every new item"
        }
        fn rationale(&self) -> &'static str {
            "test"
        }
        fn error_message(&self) -> &'static str {
            "new item"
        }
        fn kinds(&self) -> Vec<ContentKind> {
            vec![ContentKind::GenericField]
        }
        fn expected_git_statuses(&self) -> &'static [GitStatus] {
            &[GitStatus::Added]
        }
        fn obtain_invalid(&self, items: &[&ContentItem]) -> Result<Vec<ValidationResult>> {
            Ok(items
                .iter()
                .map(|item| self.invalid(item, self.error_message().to_string()))
                .collect())
        }
    }

    /// Reports `id` and `name` separately and fixes both in one call
    struct TwoFields {
        fixes: Arc<AtomicUsize>,
    }

    impl Validator for TwoFields {
        fn error_code(&self) -> &'static str {
            "ZZ200"
        }
        fn description(&self) -> &'static str {
            "flags id and name"
        }
        fn rationale(&self) -> &'static str {
            "test"
        }
        fn error_message(&self) -> &'static str {
            "bad field"
        }
        fn kinds(&self) -> Vec<ContentKind> {
            vec![ContentKind::GenericField]
        }
        fn is_auto_fixable(&self) -> bool {
            true
        }
        fn obtain_invalid(&self, items: &[&ContentItem]) -> Result<Vec<ValidationResult>> {
            let mut results = Vec::new();
            for item in items {
                for field in ["id", "name"] {
                    let mut result = self.invalid(item, self.error_message().to_string());
                    result.related_field = field.to_string();
                    results.push(result);
                }
            }
            Ok(results)
        }
        fn fix(&self, item: &mut ContentItem) -> Result<String> {
            self.fixes.fetch_add(1, Ordering::SeqCst);
            item.set("name", "Fixed")?;
            Ok("Fixed id and name".to_string())
        }
    }

    struct Named(&'static str);

    impl Validator for Named {
        fn error_code(&self) -> &'static str {
            self.0
        }
        fn description(&self) -> &'static str {
            ""
        }
        fn rationale(&self) -> &'static str {
            ""
        }
        fn error_message(&self) -> &'static str {
            ""
        }
        fn kinds(&self) -> Vec<ContentKind> {
            Vec::new()
        }
        fn obtain_invalid(&self, _items: &[&ContentItem]) -> Result<Vec<ValidationResult>> {
            Ok(Vec::new())
        }
    }

    fn generic_field(root: &Path, id: &str) -> ContentItem {
        let dir = root.join("Packs/Acme/GenericFields");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{id}.json"));
        fs::write(
            &path,
            format!(r#"{{"id": "{id}", "name": "Field", "fromVersion": "6.5.0"}}"#),
        )
        .unwrap();
        ContentItem::detect(&path, DocumentOptions::default()).unwrap()
    }

    #[test]
    fn test_register_rejects_bad_codes() {
        let mut registry = ValidatorRegistry::new();
        registry.register(Box::new(Named("AB123"))).unwrap();
        assert!(matches!(
            registry.register(Box::new(Named("AB123"))),
            Err(ContentError::DuplicateErrorCode(_))
        ));
        assert!(matches!(
            registry.register(Box::new(Named("ab123"))),
            Err(ContentError::InvalidErrorCode(_))
        ));
        assert!(matches!(
            registry.register(Box::new(Named("AB12"))),
            Err(ContentError::InvalidErrorCode(_))
        ));
        assert_eq!(registry.codes(), vec!["AB123"]);
    }

    #[test]
    fn test_defaults_have_unique_codes() {
        let registry = ValidatorRegistry::with_defaults().unwrap();
        assert_eq!(registry.len(), rules::all().len());
        assert!(registry.get("GF101").is_some());
    }

    #[test]
    fn test_panic_becomes_internal_result() {
        let root = tempdir().unwrap();
        let items = vec![generic_field(root.path(), "generic_ok")];
        let mut registry = ValidatorRegistry::new();
        registry.register(Box::new(Panicky)).unwrap();
        registry.register(Box::new(rules::GenericFieldIdPrefix)).unwrap();

        let report = registry.run(&items, &ValidationConfig::default());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].code, INTERNAL_ERROR_CODE);
        assert!(report.errors[0].message.contains("boom"));
    }

    #[test]
    fn test_git_status_filter() {
        let root = tempdir().unwrap();
        let unchanged = generic_field(root.path(), "generic_a");
        let added = generic_field(root.path(), "generic_b").with_git_status(GitStatus::Added);
        let mut registry = ValidatorRegistry::new();
        registry.register(Box::new(AddedOnly)).unwrap();

        let report = registry.run(&[unchanged, added], &ValidationConfig::default());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].path.ends_with("generic_b.json"));
    }

    #[test]
    fn test_select_ignore_and_warning() {
        let root = tempdir().unwrap();
        let items = vec![generic_field(root.path(), "foo_bar")];
        let registry = ValidatorRegistry::with_defaults().unwrap();

        let ignored = ValidationConfig {
            ignore: vec!["GF101".into()],
            ..Default::default()
        };
        assert!(registry.run(&items, &ignored).is_clean());

        let selected_other = ValidationConfig {
            select: vec!["BA106".into()],
            ..Default::default()
        };
        assert!(registry.run(&items, &selected_other).is_clean());

        let warned = ValidationConfig {
            warning: vec!["GF101".into()],
            ..Default::default()
        };
        let report = registry.run(&items, &warned);
        assert!(report.is_clean());
        assert!(report.has_warnings());
    }

    #[test]
    fn test_report_formats() {
        let result = ValidationResult {
            code: "GF101".into(),
            message: "foo_bar is not a valid id, it should start with generic_.".into(),
            path: PathBuf::from("Packs/Acme/GenericFields/foo_bar.json"),
            related_field: "id".into(),
        };
        let report = ValidationReport {
            errors: vec![result],
            ..Default::default()
        };
        assert_eq!(
            report.to_readable(),
            "Packs/Acme/GenericFields/foo_bar.json: [GF101] - foo_bar is not a valid id, it should start with generic_.\n"
        );
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json[0]["code"], "GF101");
        assert_eq!(json[0]["related_field"], "id");
    }

    #[test]
    fn test_runs_are_deterministic() {
        let root = tempdir().unwrap();
        let items = vec![
            generic_field(root.path(), "foo_bar"),
            generic_field(root.path(), "generic_ok"),
        ];
        let registry = ValidatorRegistry::with_defaults().unwrap();
        let first = registry.run(&items, &ValidationConfig::default());
        let second = registry.run(&items, &ValidationConfig::default());
        assert_eq!(first.errors, second.errors);
        assert_eq!(first.errors.len(), 1);
    }

    #[test]
    fn test_fix_runs_once_per_item() {
        let root = tempdir().unwrap();
        let mut items = vec![
            generic_field(root.path(), "generic_a"),
            generic_field(root.path(), "generic_b"),
        ];
        let fixes = Arc::new(AtomicUsize::new(0));
        let mut registry = ValidatorRegistry::new();
        registry
            .register(Box::new(TwoFields {
                fixes: Arc::clone(&fixes),
            }))
            .unwrap();

        let report = registry.run_fix(&mut items, &ValidationConfig::default());
        assert!(report.is_clean());
        assert_eq!(report.fixed.len(), 2);
        assert!(report.fixed.iter().all(|f| f.message == "Fixed id and name"));
        assert!(report.fixed.iter().all(|f| f.related_field == "id, name"));
        assert!(report.fixed[0].path.ends_with("generic_a.json"));
        assert_eq!(fixes.load(Ordering::SeqCst), 2);
        assert!(items.iter().all(|i| i.is_dirty()));
    }
}
