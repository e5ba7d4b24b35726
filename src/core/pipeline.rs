/// The main coaching pipeline: week loop → events → messages → log.
///
/// Wires together the simulation engine, event scheduler, message composer,
/// optional polisher and post-processor.
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::clock::SimClock;
use crate::core::composer::{ComposedMessage, MessageComposer};
use crate::core::config::{ConfigError, NlgProvider, RunConfig};
use crate::core::context::{extract_opener, AntiRepetitionMemory};
use crate::core::export::{self, ExportError, LogEntry};
use crate::core::polish::{CachedPolisher, OllamaPolisher, PolishError, PolishMode, PolishRequest, Polisher};
use crate::core::postprocess::PostProcessor;
use crate::core::scheduler::EventScheduler;
use crate::core::simulation::{WeekContext, WeeklySimulationEngine};
use crate::core::template::TemplateError;
use crate::core::validate::{validate_log, ValidationIssue};
use crate::core::variety::{PoolError, PoolSet};
use crate::core::voice::{VoiceError, VoiceRegistry};
use crate::schema::biomarker::BiomarkerState;
use crate::schema::event::{EventKind, EventOccurrence};
use crate::schema::message::Message;

/// XOR-ed into the run seed for the scheduling stream.
pub const SCHEDULER_STREAM: u64 = 0x5CED_0001;
/// XOR-ed into the run seed for the composition stream.
pub const COMPOSER_STREAM: u64 = 0xC0DE_0002;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("template error: {0}")]
    Template(#[from] TemplateError),
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("voice error: {0}")]
    Voice(#[from] VoiceError),
    #[error("polisher error: {0}")]
    Polish(#[from] PolishError),
    #[error("export error: {0}")]
    Export(#[from] ExportError),
}

/// State at the end of one simulated week.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekRecord {
    pub week: u32,
    pub state: BiomarkerState,
    pub context: WeekContext,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub weeks: u32,
    /// Finalized messages in log order.
    pub messages: Vec<Message>,
    /// Timestamped view of `messages`.
    pub entries: Vec<LogEntry>,
    pub final_state: BiomarkerState,
    pub history: Vec<WeekRecord>,
    /// Every scheduled event, in schedule order.
    pub events: Vec<EventOccurrence>,
}

impl RunOutput {
    pub fn events_of(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    pub fn jsonl(&self) -> Result<String, ExportError> {
        export::render_jsonl(&self.entries)
    }

    pub fn transcript(&self) -> String {
        export::render_transcript(&self.entries)
    }

    pub fn validate(&self) -> Vec<ValidationIssue> {
        validate_log(&self.entries, self.weeks)
    }

    /// Write `conversation.jsonl` and `conversation.txt` into `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<(PathBuf, PathBuf), ExportError> {
        let jsonl_path = dir.join("conversation.jsonl");
        let transcript_path = dir.join("conversation.txt");
        // Render both before touching the disk.
        let jsonl = self.jsonl()?;
        let transcript = self.transcript();
        export::write_all_atomic(&[
            (jsonl_path.as_path(), jsonl.as_str()),
            (transcript_path.as_path(), transcript.as_str()),
        ])?;
        Ok((jsonl_path, transcript_path))
    }
}

/// The top-level coaching engine. Built via `CoachingEngine::builder()`.
pub struct CoachingEngine {
    config: RunConfig,
    weeks: u32,
    clock: SimClock,
    pools: PoolSet,
    voices: VoiceRegistry,
    polisher: Option<Box<dyn Polisher>>,
    mode: Option<PolishMode>,
}

/// Builder for constructing a `CoachingEngine`.
#[derive(Default)]
pub struct CoachingEngineBuilder {
    config: Option<RunConfig>,
    seed: Option<u64>,
    weeks: Option<i64>,
    pools: Option<PoolSet>,
    pools_file: Option<PathBuf>,
    voices: Option<VoiceRegistry>,
    voices_file: Option<PathBuf>,
    polisher: Option<Box<dyn Polisher>>,
}

impl CoachingEngine {
    pub fn builder() -> CoachingEngineBuilder {
        CoachingEngineBuilder::default()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn voices(&self) -> &VoiceRegistry {
        &self.voices
    }

    /// Simulate every week and return the finalized log.
    ///
    /// With no polisher the output is a pure function of the config.
    pub fn run(&mut self) -> Result<RunOutput, EngineError> {
        let config = &self.config;
        let seed = config.seed;
        let weeks = self.weeks;
        info!(seed, weeks, client = %config.client_name, polish = self.mode.is_some(), "starting run");

        if let Some(polisher) = self.polisher.as_deref_mut() {
            polisher.warmup();
        }

        let mut state = config.baseline_state()?;
        let mut plan = config.plan()?;
        let mut changes: VecDeque<_> = config.plan_change_schedule()?.into();

        let mut simulation = WeeklySimulationEngine::new(seed, Box::new(config.travel_plan()?))
            .with_noise(config.noise_spec()?)
            .with_modifiers(config.adherence_modifiers()?)
            .with_lapse_fraction(config.lapse_fraction)
            .with_phase_every(config.schedule.phase_every);
        let mut scheduler = EventScheduler::new(
            config.schedule.clone(),
            i64::from(weeks),
            seed ^ SCHEDULER_STREAM,
        );
        let mut composer =
            MessageComposer::new(self.pools.clone(), self.voices.clone(), seed ^ COMPOSER_STREAM);
        let post = PostProcessor::new(&config.dedup)
            .with_speaker_names(self.voices.speaker_names())
            .with_member_name(self.voices.member_name());

        let mut memory = AntiRepetitionMemory::new();
        let mut ctx = WeekContext::default();
        let mut kept: Vec<Message> = Vec::new();
        let mut history = Vec::with_capacity(weeks as usize);
        let mut scheduled = Vec::new();
        let mut seq: u64 = 0;

        for week in 0..weeks {
            while changes.front().is_some_and(|(at, _)| *at <= week) {
                if let Some((_, change)) = changes.pop_front() {
                    debug!(week, ?change, "applying plan change");
                    plan.apply(change).map_err(ConfigError::from)?;
                }
            }

            simulation.advance(week, &mut state, &plan, &mut ctx);
            history.push(WeekRecord {
                week,
                state: state.clone(),
                context: ctx.clone(),
            });

            let events = scheduler.events_for_week(week, &ctx);
            for event in &events {
                let composed = composer.compose(event, &ctx, &state, &plan, &mut memory);
                let mut question_dropped = false;

                for message in composed {
                    if question_dropped && !message.role.is_member() {
                        memory.restore(message.role, message.previous_opener);
                        continue;
                    }

                    let body = match (self.polisher.as_deref_mut(), self.mode) {
                        (Some(polisher), Some(mode)) => {
                            polished_body(polisher, mode, &message, &self.voices, &post)
                        }
                        _ => post.sanitize(&message.seed, message.role),
                    };

                    if body.is_empty() || post.is_near_duplicate(message.role, &body, &kept) {
                        debug!(
                            week,
                            role = %message.role,
                            kind = event.kind.name(),
                            empty = body.is_empty(),
                            "dropped message"
                        );
                        memory.restore(message.role, message.previous_opener);
                        question_dropped = message.role.is_member();
                        continue;
                    }

                    memory.remember(message.role, extract_opener(&body));
                    kept.push(Message {
                        role: message.role,
                        week,
                        seq,
                        kind: event.kind,
                        body,
                    });
                    seq += 1;
                }
            }
            scheduled.extend(events);
        }

        let messages = post.finalize(kept);
        let entries = export::build_log(&messages, &self.clock, &self.voices);
        info!(
            weeks,
            messages = messages.len(),
            events = scheduled.len(),
            "run finished"
        );

        Ok(RunOutput {
            weeks,
            messages,
            entries,
            final_state: state,
            history,
            events: scheduled,
        })
    }
}

/// Ask the polisher for a body, falling back to the sanitized seed when it
/// fails, returns nothing usable, or repeats the previous opener.
fn polished_body(
    polisher: &mut dyn Polisher,
    mode: PolishMode,
    message: &ComposedMessage,
    voices: &VoiceRegistry,
    post: &PostProcessor,
) -> String {
    let seed = post.sanitize(&message.seed, message.role);
    let request = PolishRequest {
        role: message.role,
        event_kind: message.kind,
        facts: message.facts.clone(),
        avoid_opening_like: message.previous_opener.clone(),
        mode,
        seed: message.seed.clone(),
        tone: voices.tone(message.role).to_string(),
        display_name: voices.display_name(message.role),
    };

    let text = match polisher.polish(&request) {
        Ok(text) => text,
        Err(e) => {
            warn!(week = message.week, role = %message.role, error = %e, "polisher failed, using seed");
            return seed;
        }
    };

    let polished = post.sanitize(&text, message.role);
    if polished.is_empty() {
        warn!(week = message.week, role = %message.role, "polished body empty after sanitizing, using seed");
        return seed;
    }
    let opener = extract_opener(&polished);
    if !opener.is_empty() && message.previous_opener.as_deref() == Some(opener.as_str()) {
        warn!(week = message.week, role = %message.role, opener = %opener, "polished body repeats opener, using seed");
        return seed;
    }
    polished
}

impl CoachingEngineBuilder {
    /// Run description. Defaults to `RunConfig::default()`.
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the config's seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Override the config's week count.
    pub fn weeks(mut self, weeks: i64) -> Self {
        self.weeks = Some(weeks);
        self
    }

    /// Pools merged over the embedded defaults.
    pub fn with_pools(mut self, pools: PoolSet) -> Self {
        self.pools = Some(pools);
        self
    }

    /// Pool file merged over the embedded defaults (after `with_pools`).
    pub fn pools_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pools_file = Some(path.into());
        self
    }

    /// Voices merged over the embedded defaults.
    pub fn with_voices(mut self, voices: VoiceRegistry) -> Self {
        self.voices = Some(voices);
        self
    }

    pub fn voices_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.voices_file = Some(path.into());
        self
    }

    /// Use this polisher instead of the one the NLG config names. It is
    /// consulted only when the NLG mode is not `off`.
    pub fn with_polisher(mut self, polisher: Box<dyn Polisher>) -> Self {
        self.polisher = Some(polisher);
        self
    }

    /// Validate the config and assemble the engine. Fails before any week is
    /// simulated.
    pub fn build(self) -> Result<CoachingEngine, EngineError> {
        let mut config = self.config.unwrap_or_default();
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(weeks) = self.weeks {
            config.weeks = weeks;
        }
        config.validate()?;
        let weeks = config.week_count()?;
        let clock = SimClock::new(config.start()?, config.offset()?);

        let mut pools = PoolSet::defaults()?;
        if let Some(custom) = self.pools {
            pools.merge(custom);
        }
        if let Some(path) = &self.pools_file {
            pools.merge(PoolSet::load_from_ron(path)?);
        }

        let mut voices = VoiceRegistry::defaults()?;
        if let Some(custom) = self.voices {
            voices.merge(custom);
        }
        if let Some(path) = &self.voices_file {
            voices.load_from_ron(path)?;
        }
        voices.set_member_name(&config.client_name);

        let mode = PolishMode::from_config(config.nlg.mode);
        let polisher = match (self.polisher, mode) {
            (_, None) => None,
            (Some(polisher), Some(_)) => Some(polisher),
            (None, Some(_)) if config.nlg.provider == NlgProvider::Ollama => {
                Some(Box::new(OllamaPolisher::new(&config.nlg)?) as Box<dyn Polisher>)
            }
            (None, Some(_)) => None,
        };
        let polisher = match polisher {
            Some(inner) if config.nlg.cache => {
                Some(Box::new(CachedPolisher::new(inner, config.nlg.model.clone())) as Box<dyn Polisher>)
            }
            other => other,
        };
        let mode = mode.filter(|_| polisher.is_some());

        Ok(CoachingEngine {
            config,
            weeks,
            clock,
            pools,
            voices,
            polisher,
            mode,
        })
    }
}
