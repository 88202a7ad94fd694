//! # Pipeline Stages
//!
//! The fixed processing order and its per-run configuration.
//!
//! ## Stage Definitions
//!
//! | Stage | Output slot | Branching |
//! |-------|-------------|-----------|
//! | tokens | tokens | yes |
//! | part-of-speech | part-of-speech | yes |
//! | names | names | yes |
//! | nested-names | nested-names | yes |
//! | values | values | yes |
//! | np-chunk | np-chunk | yes |
//! | parse | parse | yes |
//! | mentions | mentions | yes |
//! | propositions | propositions | no |
//! | metonymy | mentions (replaced) | no |
//! | entities | entities | no |
//! | relations | relations | yes |
//! | events | events | yes |
//! | dependency-parse | dependency-parse | yes |
//! | actor-mentions | actor-mentions | yes |
//!
//! Non-branching stages produce at most one candidate per theory.

use crate::primitives::{DEFAULT_BEAM_WIDTH, MAX_BEAM_WIDTH, NARROW_BEAM_WIDTH, WIDE_BEAM_WIDTH};
use crate::theory::PrimaryParse;
use crate::{SubtheoryType, TheoristError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// STAGE ENUM
// =============================================================================

/// One named step in the processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Tokens,
    PartOfSpeech,
    Names,
    NestedNames,
    Values,
    NpChunk,
    Parse,
    Mentions,
    Propositions,
    Metonymy,
    Entities,
    Relations,
    Events,
    DependencyParse,
    ActorMentions,
}

impl Stage {
    /// Every stage in processing order.
    pub const ALL: [Stage; 15] = [
        Stage::Tokens,
        Stage::PartOfSpeech,
        Stage::Names,
        Stage::NestedNames,
        Stage::Values,
        Stage::NpChunk,
        Stage::Parse,
        Stage::Mentions,
        Stage::Propositions,
        Stage::Metonymy,
        Stage::Entities,
        Stage::Relations,
        Stage::Events,
        Stage::DependencyParse,
        Stage::ActorMentions,
    ];

    /// Get the stage name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Tokens => "tokens",
            Stage::PartOfSpeech => "part-of-speech",
            Stage::Names => "names",
            Stage::NestedNames => "nested-names",
            Stage::Values => "values",
            Stage::NpChunk => "np-chunk",
            Stage::Parse => "parse",
            Stage::Mentions => "mentions",
            Stage::Propositions => "propositions",
            Stage::Metonymy => "metonymy",
            Stage::Entities => "entities",
            Stage::Relations => "relations",
            Stage::Events => "events",
            Stage::DependencyParse => "dependency-parse",
            Stage::ActorMentions => "actor-mentions",
        }
    }

    /// Position in processing order.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The stage at a position in processing order.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Stage> {
        Self::ALL.get(index).copied()
    }

    /// Get the next stage, if any.
    #[must_use]
    pub fn next(&self) -> Option<Stage> {
        Self::from_index(self.index().saturating_add(1))
    }

    /// Get the previous stage, if any.
    #[must_use]
    pub fn previous(&self) -> Option<Stage> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    /// The theory slot this stage writes.
    #[must_use]
    pub fn output_type(&self) -> SubtheoryType {
        match self {
            Stage::Tokens => SubtheoryType::Tokens,
            Stage::PartOfSpeech => SubtheoryType::PartOfSpeech,
            Stage::Names => SubtheoryType::Names,
            Stage::NestedNames => SubtheoryType::NestedNames,
            Stage::Values => SubtheoryType::Values,
            Stage::NpChunk => SubtheoryType::NpChunk,
            Stage::Parse => SubtheoryType::Parse,
            Stage::Mentions | Stage::Metonymy => SubtheoryType::Mentions,
            Stage::Propositions => SubtheoryType::Propositions,
            Stage::Entities => SubtheoryType::Entities,
            Stage::Relations => SubtheoryType::Relations,
            Stage::Events => SubtheoryType::Events,
            Stage::DependencyParse => SubtheoryType::DependencyParse,
            Stage::ActorMentions => SubtheoryType::ActorMentions,
        }
    }

    /// Whether a processor may return more than one candidate per theory.
    #[must_use]
    pub fn is_branching(&self) -> bool {
        !matches!(
            self,
            Stage::Propositions | Stage::Metonymy | Stage::Entities
        )
    }

    /// Whether the stage replaces an existing slot instead of filling a new one.
    #[must_use]
    pub fn is_rewrite(&self) -> bool {
        matches!(self, Stage::Metonymy)
    }

    /// Default output beam width.
    #[must_use]
    pub fn default_beam_width(&self) -> usize {
        match self {
            Stage::Tokens | Stage::PartOfSpeech => NARROW_BEAM_WIDTH,
            Stage::Names
            | Stage::NestedNames
            | Stage::Values
            | Stage::NpChunk
            | Stage::Parse => DEFAULT_BEAM_WIDTH,
            _ => WIDE_BEAM_WIDTH,
        }
    }

    /// Default execution mode.
    #[must_use]
    pub fn default_mode(&self) -> StageMode {
        match self {
            Stage::Tokens | Stage::Parse | Stage::Mentions => StageMode::Required,
            _ => StageMode::Optional,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Stage {
    type Err = TheoristError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|stage| stage.name() == s)
            .copied()
            .ok_or_else(|| TheoristError::InvalidConfig(format!("unknown stage '{}'", s)))
    }
}

// =============================================================================
// STAGE CONFIGURATION
// =============================================================================

/// How the driver treats a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StageMode {
    /// A processor must be registered and must keep at least one path alive.
    Required,
    /// Missing or unavailable processors are replaced by an empty layer.
    #[default]
    Optional,
    /// The processor is never invoked; an empty layer is substituted.
    Skipped,
}

/// Configuration of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub stage: Stage,
    pub beam_width: usize,
    #[serde(default)]
    pub mode: StageMode,
}

impl StageConfig {
    /// Configuration with the stage's default width and mode.
    #[must_use]
    pub fn default_for(stage: Stage) -> Self {
        Self {
            stage,
            beam_width: stage.default_beam_width(),
            mode: stage.default_mode(),
        }
    }
}

/// Injected pipeline configuration.
///
/// `stages` must be a contiguous prefix of [`Stage::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub stages: Vec<StageConfig>,
    /// Ordinals (per driver, zero-based) of documents to abort deliberately.
    #[serde(default)]
    pub abort_documents: BTreeSet<usize>,
    /// Stage at which designated documents abort (default: first stage run).
    #[serde(default)]
    pub abort_at: Option<Stage>,
    /// Parse the mention layer of fresh theories is built on.
    #[serde(default)]
    pub primary_parse: PrimaryParse,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::through(Stage::ActorMentions)
    }
}

impl PipelineConfig {
    /// Default configuration for every stage up to and including `last`.
    #[must_use]
    pub fn through(last: Stage) -> Self {
        Self {
            stages: Stage::ALL
                .iter()
                .take_while(|s| **s <= last)
                .map(|s| StageConfig::default_for(*s))
                .collect(),
            abort_documents: BTreeSet::new(),
            abort_at: None,
            primary_parse: PrimaryParse::default(),
        }
    }

    /// Set one stage's width (builder style).
    #[must_use]
    pub fn with_width(mut self, stage: Stage, width: usize) -> Self {
        if let Some(cfg) = self.stages.iter_mut().find(|c| c.stage == stage) {
            cfg.beam_width = width;
        }
        self
    }

    /// Set one stage's mode (builder style).
    #[must_use]
    pub fn with_mode(mut self, stage: Stage, mode: StageMode) -> Self {
        if let Some(cfg) = self.stages.iter_mut().find(|c| c.stage == stage) {
            cfg.mode = mode;
        }
        self
    }

    /// Validate stage order, widths and the abort stage.
    pub fn validate(&self) -> Result<(), TheoristError> {
        if self.stages.is_empty() {
            return Err(TheoristError::InvalidConfig(
                "no stages configured".to_string(),
            ));
        }
        for (position, cfg) in self.stages.iter().enumerate() {
            if cfg.stage.index() != position {
                return Err(TheoristError::InvalidConfig(format!(
                    "stage {} at position {} breaks processing order",
                    cfg.stage, position
                )));
            }
            if cfg.beam_width == 0 || cfg.beam_width > MAX_BEAM_WIDTH {
                return Err(TheoristError::InvalidConfig(format!(
                    "stage {} beam width {} outside 1..={}",
                    cfg.stage, cfg.beam_width, MAX_BEAM_WIDTH
                )));
            }
        }
        if let Some(first) = self.stages.first()
            && first.mode == StageMode::Skipped
        {
            return Err(TheoristError::InvalidConfig(
                "the tokens stage cannot be skipped".to_string(),
            ));
        }
        if let Some(stage) = self.abort_at
            && self.stage_config(stage).is_none()
        {
            return Err(TheoristError::InvalidConfig(format!(
                "abort stage {} is not configured",
                stage
            )));
        }
        Ok(())
    }

    /// Configuration of one stage, if it is part of the pipeline.
    #[must_use]
    pub fn stage_config(&self, stage: Stage) -> Option<&StageConfig> {
        self.stages.iter().find(|c| c.stage == stage)
    }

    /// The first configured stage.
    #[must_use]
    pub fn first_stage(&self) -> Option<Stage> {
        self.stages.first().map(|c| c.stage)
    }

    /// The last configured stage.
    #[must_use]
    pub fn last_stage(&self) -> Option<Stage> {
        self.stages.last().map(|c| c.stage)
    }

    /// The whole configured range.
    pub fn full_range(&self) -> Result<StageRange, TheoristError> {
        match (self.first_stage(), self.last_stage()) {
            (Some(start), Some(end)) => Ok(StageRange { start, end }),
            _ => Err(TheoristError::InvalidConfig(
                "no stages configured".to_string(),
            )),
        }
    }
}

// =============================================================================
// STAGE RANGE
// =============================================================================

/// An inclusive span of stages for one driver run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRange {
    pub start: Stage,
    pub end: Stage,
}

impl StageRange {
    /// Create a range.
    #[must_use]
    pub fn new(start: Stage, end: Stage) -> Self {
        Self { start, end }
    }

    /// Whether `stage` falls inside the range.
    #[must_use]
    pub fn contains(&self, stage: Stage) -> bool {
        self.start <= stage && stage <= self.end
    }

    /// The stages of the range, in order.
    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        Stage::ALL.into_iter().filter(|s| self.contains(*s))
    }

    /// Check the range against a configuration.
    pub fn validate(&self, config: &PipelineConfig) -> Result<(), TheoristError> {
        if self.start > self.end {
            return Err(TheoristError::InvalidConfig(format!(
                "stage range {}..={} is reversed",
                self.start, self.end
            )));
        }
        for stage in [self.start, self.end] {
            if config.stage_config(stage).is_none() {
                return Err(TheoristError::InvalidConfig(format!(
                    "stage {} is not configured",
                    stage
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for StageRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_navigation() {
        assert_eq!(Stage::Tokens.previous(), None);
        assert_eq!(Stage::Tokens.next(), Some(Stage::PartOfSpeech));
        assert_eq!(Stage::Metonymy.previous(), Some(Stage::Propositions));
        assert_eq!(Stage::ActorMentions.next(), None);
    }

    #[test]
    fn metonymy_writes_mentions() {
        assert_eq!(Stage::Metonymy.output_type(), SubtheoryType::Mentions);
        assert!(Stage::Metonymy.is_rewrite());
        assert!(!Stage::Metonymy.is_branching());
        assert!(Stage::Parse.is_branching());
    }

    #[test]
    fn every_subtheory_type_has_a_stage() {
        for kind in SubtheoryType::ALL {
            assert!(Stage::ALL.iter().any(|s| s.output_type() == kind));
        }
    }

    #[test]
    fn stage_parses_from_name() {
        for stage in Stage::ALL {
            assert_eq!(stage.name().parse::<Stage>().expect("parse"), stage);
        }
        assert!("lemmas".parse::<Stage>().is_err());
    }

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().expect("default config");
        assert_eq!(config.stages.len(), Stage::ALL.len());
        assert_eq!(config.first_stage(), Some(Stage::Tokens));
        assert_eq!(config.last_stage(), Some(Stage::ActorMentions));
    }

    #[test]
    fn gap_in_stage_order_rejected() {
        let mut config = PipelineConfig::through(Stage::Parse);
        config.stages.remove(2);
        assert!(matches!(
            config.validate(),
            Err(TheoristError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_width_rejected() {
        let config = PipelineConfig::through(Stage::Names).with_width(Stage::Names, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn skipped_tokens_rejected() {
        let config =
            PipelineConfig::through(Stage::Names).with_mode(Stage::Tokens, StageMode::Skipped);
        assert!(config.validate().is_err());
    }

    #[test]
    fn abort_stage_must_be_configured() {
        let mut config = PipelineConfig::through(Stage::Parse);
        config.abort_at = Some(Stage::Events);
        assert!(config.validate().is_err());
    }

    #[test]
    fn range_membership() {
        let range = StageRange::new(Stage::Names, Stage::Parse);
        assert!(range.contains(Stage::Values));
        assert!(!range.contains(Stage::Tokens));
        assert_eq!(range.stages().count(), 5);

        let config = PipelineConfig::through(Stage::Names);
        assert!(range.validate(&config).is_err());
        assert!(StageRange::new(Stage::Parse, Stage::Names)
            .validate(&PipelineConfig::default())
            .is_err());
    }

    #[test]
    fn config_serde_roundtrip() {
        let mut config = PipelineConfig::through(Stage::Values);
        config.abort_documents.insert(3);
        config.abort_at = Some(Stage::Names);
        let bytes = postcard::to_allocvec(&config).expect("serialize");
        let back: PipelineConfig = postcard::from_bytes(&bytes).expect("deserialize");
        assert_eq!(back, config);
    }
}
