//! Listing dataset entities together with their content.

use std::ops::RangeInclusive;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::TransferConfig;
use crate::dataset::DatasetRef;
use crate::error::DataportError;
use crate::remote::{DatasetService, EntityRecord};
use crate::store::ObjectStore;

/// Which entities to list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntitySelector {
    /// The single entity at this offset.
    Offset(u64),
    /// Entities at offsets `start..=end`.
    Range(RangeInclusive<u64>),
    /// Lookup by name. Not supported by the service.
    Name(String),
    /// Scattered offsets. Not supported by the service.
    Offsets(Vec<u64>),
}

impl EntitySelector {
    /// `(offset, page_size)` of the single page this selector covers.
    pub fn page(&self) -> Result<(u64, u64), DataportError> {
        match self {
            EntitySelector::Offset(offset) => Ok((*offset, 1)),
            EntitySelector::Range(range) => {
                let (start, end) = (*range.start(), *range.end());
                if end < start {
                    return Err(DataportError::UnsupportedOperation(format!(
                        "entity range {start}..={end} is empty"
                    )));
                }
                let size = (end - start).checked_add(1).ok_or_else(|| {
                    DataportError::UnsupportedOperation(format!(
                        "entity range {start}..={end} is larger than one page can hold"
                    ))
                })?;
                Ok((start, size))
            }
            EntitySelector::Name(name) => Err(DataportError::UnsupportedOperation(format!(
                "selecting entities by name ('{name}') is not supported, use an offset or range"
            ))),
            EntitySelector::Offsets(_) => Err(DataportError::UnsupportedOperation(
                "selecting entities by a list of offsets is not supported, use an offset or range"
                    .to_string(),
            )),
        }
    }
}

/// An entity with its content fetched.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Entity {
    pub id: String,
    pub content: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// List the selected entities of `dataset`, fetching each one's content.
pub fn list_entities(
    dataset: &DatasetRef,
    selector: &EntitySelector,
    service: &dyn DatasetService,
    store: &dyn ObjectStore,
    config: &TransferConfig,
) -> Result<Vec<Entity>, DataportError> {
    let (offset, page_size) = selector.page()?;
    let records = service.list_entities(&dataset.dataset_id, offset, page_size)?;
    debug!(
        dataset = %dataset.dataset_id,
        offset,
        page_size,
        listed = records.len(),
        "listed entities"
    );

    records
        .into_iter()
        .map(|record| fetch_entity(record, store, config.entity_retry_times))
        .collect()
}

/// Fetch one entity's content, trying up to `attempts` times.
///
/// Only non-2xx responses are retried; transport errors propagate at once.
pub fn fetch_entity(
    record: EntityRecord,
    store: &dyn ObjectStore,
    attempts: u32,
) -> Result<Entity, DataportError> {
    let attempts = attempts.max(1);
    let mut last_status = 0;

    for attempt in 1..=attempts {
        let response = store.fetch_text(&record.url)?;
        if response.is_success() {
            return Ok(Entity {
                id: record.id,
                content: response.body,
                extra: record.extra,
            });
        }
        last_status = response.status;
        warn!(
            entity = %record.id,
            url = %record.url,
            status = response.status,
            attempt,
            attempts,
            "entity content fetch failed"
        );
    }

    Err(DataportError::EntityFetch {
        entity_id: record.id,
        url: record.url,
        attempts,
        status: last_status,
    })
}
