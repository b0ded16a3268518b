//! All registered sources and fields, and the operations the collector runs
//! against them under its lock.

use std::sync::Arc;
use std::time::Instant;

use crate::clock::Clock;
use crate::config::CollectorConfig;
use crate::field::{self, FieldId, FieldMetadata, FieldSpec, Recorded};
use crate::scan::Scanner;
use crate::source::Source;
use crate::stats::CycleStats;
use crate::timeseries::Sample;
use crate::{Error, Result};

pub struct Registry {
    sources: Vec<Source>,
    scanner: Scanner,
    clock: Option<Arc<dyn Clock>>,
    next_id: FieldId,
    log_capacity: usize,
}

impl Registry {
    pub fn new(config: &CollectorConfig) -> Self {
        Self {
            sources: Vec::new(),
            scanner: Scanner::new(config.chunk_size()),
            clock: None,
            next_id: 0,
            log_capacity: config.log_capacity,
        }
    }

    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = Some(clock);
    }

    pub fn has_clock(&self) -> bool {
        self.clock.is_some()
    }

    /// Sources in registration order.
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn field(&self, id: FieldId) -> Option<&FieldSpec> {
        self.sources.iter().find_map(|source| source.field(id))
    }

    fn field_mut(&mut self, id: FieldId) -> Option<&mut FieldSpec> {
        self.sources.iter_mut().find_map(|source| source.field_mut(id))
    }

    pub fn active_fields(&self) -> usize {
        self.sources
            .iter()
            .flat_map(Source::fields)
            .filter(|field| field.is_active())
            .count()
    }

    /// Parse `spec` and register the field, merging it into an existing
    /// source for the same path.
    ///
    /// Nothing is retained when this fails.
    pub fn describe(&mut self, spec: &str) -> Result<FieldMetadata> {
        let source = field::parse(spec, self.next_id)?;
        let metadata = source
            .fields()
            .next()
            .map(FieldSpec::metadata)
            .ok_or_else(|| Error::Config(format!("no field parsed from {spec:?}")))?;

        match self
            .sources
            .iter_mut()
            .find(|existing| existing.path() == source.path())
        {
            Some(existing) => existing.merge(source)?,
            None => {
                self.sources
                    .try_reserve(1)
                    .map_err(|_| Error::Alloc("source list"))?;
                self.sources.push(source);
            }
        }
        self.next_id += 1;
        log::debug!("registered field {} as id {}", metadata.name, metadata.id);
        Ok(metadata)
    }

    /// Start logging the described field called `name`.
    ///
    /// Its source is scanned once; the value found becomes the diff baseline.
    /// Fields sharing the name in other sources are tried in registration
    /// order until one yields a value.
    ///
    /// # Errors
    ///
    /// - `Error::Activation`: no field with that name, or no value found
    /// - `Error::SourceUnavailable`: the only candidates' sources are unreadable
    pub fn activate(&mut self, name: &str) -> Result<FieldId> {
        let Registry {
            sources,
            scanner,
            log_capacity,
            ..
        } = self;

        let mut last_error = None;
        for source in sources.iter_mut() {
            let candidates: Vec<FieldId> = source
                .fields()
                .filter(|field| field.name == name)
                .map(|field| field.id)
                .collect();
            for id in candidates {
                match activate_field(scanner, source, id, *log_capacity) {
                    Ok(()) => return Ok(id),
                    Err(err) => {
                        log::warn!("could not activate {name:?}: {err}");
                        last_error = Some(err);
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::Activation(format!("no field named {name:?}"))))
    }

    /// Scan every source with an active field once and append what was found.
    pub fn run_cycle(&mut self) -> CycleStats {
        let start = Instant::now();
        let mut stats = CycleStats::new();
        let Some(clock) = self.clock.clone() else {
            stats.skipped = true;
            return stats;
        };

        for source in self.sources.iter_mut() {
            if !source.has_active_fields() {
                continue;
            }
            stats.sources_scanned += 1;
            let found = match self.scanner.scan(source, false) {
                Ok(found) => found,
                Err(err) => {
                    log::debug!("skipping {}: {err}", source.path().display());
                    stats.sources_unavailable += 1;
                    continue;
                }
            };
            stats.values_extracted += found.len();

            for value in found {
                let Some(field) = source.field_mut(value.field_id) else {
                    continue;
                };
                if !field.is_active() {
                    continue;
                }
                match field.record(value.raw, clock.now()) {
                    Ok(Recorded::Stored) => stats.samples_stored += 1,
                    Ok(Recorded::Repeated) => stats.repeats += 1,
                    Ok(Recorded::Inactive) => {}
                    Err(err) => {
                        log::error!("dropping value for {:?}: {err}", field.name);
                        stats.record_error(format!("{}: {err}", field.name));
                    }
                }
            }
        }

        stats.duration = start.elapsed();
        stats
    }

    /// Hand out the stored samples of field `id` and reset its log.
    ///
    /// Unknown and inactive ids yield an empty vector.
    pub fn drain(&mut self, id: FieldId) -> Vec<Sample> {
        let Some(log) = self.field_mut(id).and_then(FieldSpec::log_mut) else {
            return Vec::new();
        };
        match log.drain() {
            Ok(samples) => {
                log.reset();
                samples
            }
            Err(err) => {
                log::error!("could not drain field {id}: {err}");
                Vec::new()
            }
        }
    }
}

fn activate_field(
    scanner: &mut Scanner,
    source: &mut Source,
    id: FieldId,
    log_capacity: usize,
) -> Result<()> {
    if source.field(id).is_some_and(FieldSpec::is_active) {
        return Ok(());
    }
    if !source.check_access() {
        log::warn!("{} can not be accessed for reading", source.path().display());
    }
    let found = scanner.scan(source, true)?;
    let baseline = found
        .iter()
        .find(|value| value.field_id == id)
        .map(|value| value.raw)
        .ok_or_else(|| {
            Error::Activation(format!(
                "field {id} not found in {}",
                source.path().display()
            ))
        })?;
    let path = source.path().display().to_string();
    let field = source
        .field_mut(id)
        .ok_or_else(|| Error::Activation(format!("field {id} vanished from its source")))?;
    field.start_logging(baseline, log_capacity);
    log::info!(
        "logging {:?} from {path} (baseline {})",
        field.name,
        baseline.typed(field.datatype)
    );
    Ok(())
}
