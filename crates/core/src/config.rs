use std::time::Duration;

use crate::error::CoreError;
use crate::job::{
    PollOptions, MANNEQUIN_MAX_ATTEMPTS, RENDER_MAX_ATTEMPTS, SINGLE_IMAGE_MAX_ATTEMPTS,
};

/// Default debounce between the last selection change and a speculative composite.
pub const DEFAULT_PRECOMPOSITE_DEBOUNCE: Duration = Duration::from_millis(2000);

/// Default bucket composites are uploaded to.
pub const DEFAULT_COMPOSITE_BUCKET: &str = "composites";

/// Default per-request garment limit of the render model.
pub const DEFAULT_MODEL_MAX_ITEMS: usize = 4;

/// The render model and how many garments it accepts in one request.
///
/// Selections above `max_items` go through the mannequin stage first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderModel {
    pub name: String,
    pub max_items: usize,
}

impl RenderModel {
    pub fn new(name: impl Into<String>, max_items: usize) -> Self {
        Self {
            name: name.into(),
            max_items,
        }
    }

    /// Whether a selection of `item_count` garments needs the mannequin stage.
    pub fn needs_mannequin(&self, item_count: usize) -> bool {
        item_count > self.max_items
    }
}

impl Default for RenderModel {
    fn default() -> Self {
        Self::new("default", DEFAULT_MODEL_MAX_ITEMS)
    }
}

/// Generation pipeline configuration.
///
/// All fields have defaults matching the production service; override
/// via environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Poll bounds for headshot, body composite and product shot jobs.
    pub single_image_poll: PollOptions,
    /// Poll bounds for the mannequin stage.
    pub mannequin_poll: PollOptions,
    /// Poll bounds for the outfit render stage.
    pub render_poll: PollOptions,
    /// Feature flag for speculative background compositing.
    pub precomposite_enabled: bool,
    pub precomposite_debounce: Duration,
    pub composite_bucket: String,
    pub render_model: RenderModel,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            single_image_poll: PollOptions::single_image(),
            mannequin_poll: PollOptions::mannequin(),
            render_poll: PollOptions::render(),
            precomposite_enabled: true,
            precomposite_debounce: DEFAULT_PRECOMPOSITE_DEBOUNCE,
            composite_bucket: DEFAULT_COMPOSITE_BUCKET.to_string(),
            render_model: RenderModel::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default      |
    /// |----------------------------|--------------|
    /// | `POLL_INTERVAL_MS`         | `2000`       |
    /// | `SINGLE_JOB_MAX_ATTEMPTS`  | `60`         |
    /// | `MANNEQUIN_MAX_ATTEMPTS`   | `60`         |
    /// | `RENDER_MAX_ATTEMPTS`      | `120`        |
    /// | `PRECOMPOSITE_ENABLED`     | `true`       |
    /// | `PRECOMPOSITE_DEBOUNCE_MS` | `2000`       |
    /// | `COMPOSITE_BUCKET`         | `composites` |
    /// | `RENDER_MODEL`             | `default`    |
    /// | `RENDER_MODEL_MAX_ITEMS`   | `4`          |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let interval = Duration::from_millis(parse_or(&lookup, "POLL_INTERVAL_MS", 2000u64)?);
        if interval.is_zero() {
            return Err(CoreError::Config("POLL_INTERVAL_MS must be positive".into()));
        }

        let single = parse_or(&lookup, "SINGLE_JOB_MAX_ATTEMPTS", SINGLE_IMAGE_MAX_ATTEMPTS)?;
        let mannequin = parse_or(&lookup, "MANNEQUIN_MAX_ATTEMPTS", MANNEQUIN_MAX_ATTEMPTS)?;
        let render = parse_or(&lookup, "RENDER_MAX_ATTEMPTS", RENDER_MAX_ATTEMPTS)?;
        for (key, value) in [
            ("SINGLE_JOB_MAX_ATTEMPTS", single),
            ("MANNEQUIN_MAX_ATTEMPTS", mannequin),
            ("RENDER_MAX_ATTEMPTS", render),
        ] {
            if value == 0 {
                return Err(CoreError::Config(format!("{key} must be at least 1")));
            }
        }

        let precomposite_enabled = parse_bool_or(&lookup, "PRECOMPOSITE_ENABLED", true)?;
        let debounce_ms = parse_or(
            &lookup,
            "PRECOMPOSITE_DEBOUNCE_MS",
            DEFAULT_PRECOMPOSITE_DEBOUNCE.as_millis() as u64,
        )?;

        let composite_bucket = lookup("COMPOSITE_BUCKET")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_COMPOSITE_BUCKET.to_string());

        let model_name = lookup("RENDER_MODEL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "default".to_string());
        let max_items = parse_or(&lookup, "RENDER_MODEL_MAX_ITEMS", DEFAULT_MODEL_MAX_ITEMS)?;
        if max_items == 0 {
            return Err(CoreError::Config(
                "RENDER_MODEL_MAX_ITEMS must be at least 1".into(),
            ));
        }

        Ok(Self {
            single_image_poll: PollOptions::new(interval, single),
            mannequin_poll: PollOptions::new(interval, mannequin),
            render_poll: PollOptions::new(interval, render),
            precomposite_enabled,
            precomposite_debounce: Duration::from_millis(debounce_ms),
            composite_bucket,
            render_model: RenderModel::new(model_name, max_items),
        })
    }
}

/// Helper: parse an optional variable, falling back to `default` when unset.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, CoreError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Config(format!("{key} has invalid value '{raw}'"))),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(lookup: &F, key: &str, default: bool) -> Result<bool, CoreError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(CoreError::Config(format!("{key} must be a boolean, got '{v}'"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = PipelineConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.mannequin_poll, PollOptions::mannequin());
        assert_eq!(config.render_poll, PollOptions::render());
        assert_eq!(config.single_image_poll, PollOptions::single_image());
        assert!(config.precomposite_enabled);
        assert_eq!(config.precomposite_debounce, Duration::from_secs(2));
        assert_eq!(config.composite_bucket, "composites");
        assert_eq!(config.render_model, RenderModel::default());
    }

    #[test]
    fn overrides_apply_to_every_preset() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("POLL_INTERVAL_MS", "500"),
            ("RENDER_MAX_ATTEMPTS", "10"),
            ("PRECOMPOSITE_ENABLED", "off"),
            ("RENDER_MODEL", "studio-v2"),
            ("RENDER_MODEL_MAX_ITEMS", "6"),
        ]))
        .unwrap();
        assert_eq!(config.render_poll.interval, Duration::from_millis(500));
        assert_eq!(config.render_poll.max_attempts, 10);
        assert_eq!(config.mannequin_poll.interval, Duration::from_millis(500));
        assert!(!config.precomposite_enabled);
        assert_eq!(config.render_model, RenderModel::new("studio-v2", 6));
    }

    #[test]
    fn invalid_values_are_config_errors() {
        assert_matches!(
            PipelineConfig::from_lookup(lookup_from(&[("POLL_INTERVAL_MS", "soon")])),
            Err(CoreError::Config(_))
        );
        assert_matches!(
            PipelineConfig::from_lookup(lookup_from(&[("POLL_INTERVAL_MS", "0")])),
            Err(CoreError::Config(_))
        );
        assert_matches!(
            PipelineConfig::from_lookup(lookup_from(&[("RENDER_MAX_ATTEMPTS", "0")])),
            Err(CoreError::Config(_))
        );
        assert_matches!(
            PipelineConfig::from_lookup(lookup_from(&[("PRECOMPOSITE_ENABLED", "maybe")])),
            Err(CoreError::Config(_))
        );
    }

    #[test]
    fn mannequin_threshold_is_strictly_above_limit() {
        let model = RenderModel::new("m", 4);
        assert!(!model.needs_mannequin(3));
        assert!(!model.needs_mannequin(4));
        assert!(model.needs_mannequin(5));
    }
}
