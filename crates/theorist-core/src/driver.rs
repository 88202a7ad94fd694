//! # Stage Driver
//!
//! Advances every sentence beam of a document through a range of stages.
//!
//! ## Per-stage Expansion
//!
//! ```text
//! for each theory T in the current beam (best first):
//!     candidates = processor.expand(T)          // 0..K
//!     for each candidate c:
//!         fork T, adopt c, insert into the next beam
//! empty next beam => StageProducedNothing
//! ```
//!
//! Skipped stages and optional stages without a usable processor substitute
//! the canonical empty subtheory. The metonymy stage rewrites the mention
//! slot by adopting a tagged copy, so theories sharing the old mention set
//! never observe the tag.
//!
//! One sentence runs the whole range before the next one starts. When the
//! range ends at the last configured stage every sentence is committed and
//! the document processors run.

use crate::beam::Beam;
use crate::document::DocTheory;
use crate::subtheory::Subtheory;
use crate::system::{
    DocumentProcessor, PipelineConfig, Stage, StageConfig, StageInput, StageMode, StageProcessor,
    StageRange, StageRegistry,
};
use crate::theory::Theory;
use crate::{IntegrityRule, TheoristError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, debug_span, info, info_span, warn};

// =============================================================================
// REPORT
// =============================================================================

/// Outcome of one [`Driver::process_document`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentReport {
    pub doc_id: String,
    pub sentences_processed: usize,
    pub sentences_committed: usize,
    /// Cumulative wall time per stage across all sentences.
    pub stage_timings: BTreeMap<Stage, Duration>,
    /// Names of the document layers installed by document processors.
    pub layers_built: Vec<&'static str>,
}

impl DocumentReport {
    fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            ..Self::default()
        }
    }

    /// Total time spent in stages.
    #[must_use]
    pub fn total_time(&self) -> Duration {
        self.stage_timings.values().sum()
    }
}

// =============================================================================
// DRIVER
// =============================================================================

/// Sequences stage processors over the sentences of documents.
pub struct Driver {
    config: PipelineConfig,
    processors: StageRegistry,
    document_processors: Vec<Box<dyn DocumentProcessor>>,
    documents_started: usize,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("config", &self.config)
            .field("processors", &self.processors)
            .field("document_processors", &self.document_processors.len())
            .field("documents_started", &self.documents_started)
            .finish()
    }
}

impl Driver {
    /// Create a driver for a validated configuration.
    pub fn new(config: PipelineConfig) -> Result<Self, TheoristError> {
        config.validate()?;
        Ok(Self {
            config,
            processors: StageRegistry::new(),
            document_processors: Vec::new(),
            documents_started: 0,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Register a stage processor, replacing any previous one for its stage.
    pub fn register(&mut self, processor: Box<dyn StageProcessor>) {
        let stage = processor.stage();
        if self.processors.register(processor).is_some() {
            debug!(%stage, "stage processor replaced");
        }
    }

    /// Register a document processor. They run in registration order.
    pub fn register_document_processor(&mut self, processor: Box<dyn DocumentProcessor>) {
        self.document_processors.push(processor);
    }

    /// Number of documents this driver has started.
    #[must_use]
    pub fn documents_started(&self) -> usize {
        self.documents_started
    }

    /// Run `range` over every sentence of `doc`.
    ///
    /// A range starting at tokens begins from one empty theory per
    /// sentence. A later start resumes from the beams already installed in
    /// `doc`, which must hold the previous stage's output.
    ///
    /// Sentence failures are reported as [`TheoristError::DocumentFailed`];
    /// sentences already processed keep their new beams.
    pub fn process_document(
        &mut self,
        doc: &mut DocTheory,
        range: StageRange,
    ) -> Result<DocumentReport, TheoristError> {
        range.validate(&self.config)?;
        let ordinal = self.documents_started;
        self.documents_started = self.documents_started.saturating_add(1);

        let abort_stage = self.config.abort_documents.contains(&ordinal).then(|| {
            match self.config.abort_at {
                Some(stage) if !range.contains(stage) => {
                    warn!(
                        %stage,
                        %range,
                        ordinal,
                        "abort stage outside run; aborting at first stage"
                    );
                    range.start
                }
                Some(stage) => stage,
                None => range.start,
            }
        });

        let doc_id = doc.doc_id().to_string();
        let span = info_span!("document", doc_id = %doc_id, ordinal, %range);
        let _enter = span.enter();

        let commit = self.config.last_stage() == Some(range.end);
        let mut report = DocumentReport::new(doc_id.as_str());

        for index in 0..doc.n_sentences() {
            self.process_sentence(doc, index, range, abort_stage, ordinal, &mut report)?;
            report.sentences_processed = report.sentences_processed.saturating_add(1);

            if commit && doc.commit_sentence(index)? {
                report.sentences_committed = report.sentences_committed.saturating_add(1);
            }
        }

        if commit && doc.is_fully_committed() {
            for processor in &mut self.document_processors {
                if let Some(layer) = processor.process(doc)? {
                    let name = layer.name();
                    doc.set_layer(layer);
                    report.layers_built.push(name);
                    debug!(processor = processor.name(), layer = name, "document layer built");
                }
            }
        }

        info!(
            sentences = report.sentences_processed,
            committed = report.sentences_committed,
            layers = report.layers_built.len(),
            "document processed"
        );
        Ok(report)
    }

    fn process_sentence(
        &mut self,
        doc: &mut DocTheory,
        index: usize,
        range: StageRange,
        abort_stage: Option<Stage>,
        ordinal: usize,
        report: &mut DocumentReport,
    ) -> Result<(), TheoristError> {
        let span = debug_span!("sentence", index);
        let _enter = span.enter();
        let doc_id = doc.doc_id().to_string();
        let fail = |stage: Stage, source: TheoristError| TheoristError::DocumentFailed {
            doc_id: doc_id.clone(),
            stage,
            sentence: index,
            source: Box::new(source),
        };

        let mut beam = match self.initial_beam(doc, index, range) {
            Ok(beam) => beam,
            Err(e) => return Err(fail(range.start, e)),
        };

        for stage in range.stages() {
            if abort_stage == Some(stage) {
                warn!(%stage, ordinal, "intentional abort");
                return Err(fail(
                    stage,
                    TheoristError::IntentionalAbort {
                        index: ordinal,
                        doc_id: doc_id.clone(),
                        stage,
                    },
                ));
            }

            let Some(cfg) = self.config.stage_config(stage) else {
                return Err(fail(
                    stage,
                    TheoristError::InvalidConfig(format!("stage {} is not configured", stage)),
                ));
            };
            let Some(sentence) = doc.sentence(index) else {
                return Err(fail(stage, TheoristError::SentenceOutOfRange(index)));
            };
            let input = StageInput {
                document: doc.document(),
                sentence,
                sentence_index: index,
            };

            let started = Instant::now();
            beam = match run_stage(&mut self.processors, cfg, &input, beam) {
                Ok(next) => next,
                Err(e) => return Err(fail(stage, e)),
            };
            let elapsed = started.elapsed();
            let total = report.stage_timings.entry(stage).or_default();
            *total = total.saturating_add(elapsed);
        }

        let installed = doc.install_beam(index, beam);
        installed.map_err(|e| fail(range.end, e))
    }

    /// The beam a sentence enters the range with.
    fn initial_beam(
        &self,
        doc: &mut DocTheory,
        index: usize,
        range: StageRange,
    ) -> Result<Beam, TheoristError> {
        let Some(previous) = range.start.previous() else {
            let theory = Theory::new(doc.doc_id()).with_primary_parse(self.config.primary_parse);
            return Ok(Beam::with_theory(index, 1, theory));
        };

        let required = previous.output_type();
        let missing_input = || {
            TheoristError::structural(IntegrityRule::ResumeWithoutInput {
                stage: range.start,
                missing: required,
            })
        };
        let installed = doc
            .beam(index)
            .ok_or(TheoristError::SentenceOutOfRange(index))?;
        if installed.is_empty() {
            return Err(missing_input());
        }
        for theory in installed {
            if theory.get_subtheory(required).is_none() {
                return Err(missing_input());
            }
            theory.verify_stage_prefix()?;
        }

        let mut beam = doc.take_beam(index)?;
        beam.invalidate_unique_cache();
        debug!(theories = beam.n_theories(), from = %previous, "resuming from installed beam");
        Ok(beam)
    }
}

// =============================================================================
// STAGE EXECUTION
// =============================================================================

/// Expand `current` through one stage and return the next beam.
fn run_stage(
    processors: &mut StageRegistry,
    cfg: &StageConfig,
    input: &StageInput<'_>,
    current: Beam,
) -> Result<Beam, TheoristError> {
    let stage = cfg.stage;
    let span = debug_span!("stage", %stage);
    let _enter = span.enter();

    let processor = match (cfg.mode, processors.get_mut(stage)) {
        (StageMode::Skipped, _) => None,
        (_, Some(processor)) if processor.is_available() => Some(processor),
        (StageMode::Optional, _) => None,
        (StageMode::Required, _) => return Err(TheoristError::MissingProcessor(stage)),
    };

    let mut next = match processor {
        None => substitute_all(cfg, input, &current)?,
        Some(processor) => expand_all(processor, cfg, input, &current)?,
    };
    drop(current);

    if next.is_empty() {
        return Err(TheoristError::StageProducedNothing {
            stage,
            sentence: input.sentence_index,
        });
    }
    next.invalidate_unique_cache();
    debug!(theories = next.n_theories(), "stage complete");
    Ok(next)
}

/// Fill the stage's slot with the canonical empty subtheory in every theory.
fn substitute_all(
    cfg: &StageConfig,
    input: &StageInput<'_>,
    current: &Beam,
) -> Result<Beam, TheoristError> {
    debug!(mode = ?cfg.mode, "substituting empty layer");
    let mut next = Beam::new(input.sentence_index, cfg.beam_width);
    for theory in current {
        next.add_theory(substitute(cfg.stage, input, theory)?);
    }
    Ok(next)
}

/// A fork of `theory` with the stage's empty layer, or an unchanged fork for
/// a rewrite stage.
fn substitute(
    stage: Stage,
    input: &StageInput<'_>,
    theory: &Theory,
) -> Result<Theory, TheoristError> {
    let mut forked = theory.fork();
    if !stage.is_rewrite() {
        let kind = stage.output_type();
        let empty = Subtheory::empty(kind, input.sentence_index, theory);
        forked.adopt_subtheory(kind, Rc::new(empty))?;
    }
    Ok(forked)
}

fn expand_all(
    processor: &mut dyn StageProcessor,
    cfg: &StageConfig,
    input: &StageInput<'_>,
    current: &Beam,
) -> Result<Beam, TheoristError> {
    let stage = cfg.stage;
    let kind = stage.output_type();
    let max_candidates = if stage.is_branching() {
        cfg.beam_width
    } else {
        1
    };

    let mut next = Beam::new(input.sentence_index, cfg.beam_width);
    let mut out = Vec::with_capacity(max_candidates);
    let mut pruned = 0usize;

    for (rank, theory) in current.iter().enumerate() {
        out.clear();
        let count = processor.expand(input, theory, max_candidates, &mut out)?;
        if count != out.len() {
            return Err(TheoristError::ProcessorContract {
                stage,
                detail: format!("reported {} candidates but produced {}", count, out.len()),
            });
        }
        if out.len() > max_candidates {
            return Err(TheoristError::ProcessorContract {
                stage,
                detail: format!(
                    "produced {} candidates for a buffer of {}",
                    out.len(),
                    max_candidates
                ),
            });
        }

        if out.is_empty() {
            if cfg.mode == StageMode::Required {
                warn!(%stage, rank, "no candidates, path dropped");
            } else {
                debug!(rank, "no candidates, empty layer substituted");
                next.add_theory(substitute(stage, input, theory)?);
            }
            continue;
        }

        for candidate in out.drain(..) {
            let mut forked = theory.fork();
            forked.adopt_subtheory(kind, Rc::new(candidate))?;
            if !next.add_theory(forked) {
                pruned = pruned.saturating_add(1);
            }
        }
    }

    if pruned > 0 {
        debug!(pruned, "candidates ranked below a full beam");
    }
    Ok(next)
}

// =============================================================================
// TESTS
// =============================================================================
