use crate::order::{Item, ItemStatus};

/// One item to extract.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub id: String,
    pub order_id: String,
    pub item_id: String,
}

impl ExtractionJob {
    pub fn new(order_id: &str, item_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            item_id: item_id.to_string(),
        }
    }

    /// Jobs for the ids returned by a submit.
    pub fn for_items<'a, I>(order_id: &str, item_ids: I) -> Vec<Self>
    where
        I: IntoIterator<Item = &'a String>,
    {
        item_ids
            .into_iter()
            .map(|item_id| Self::new(order_id, item_id))
            .collect()
    }
}

#[derive(Debug)]
pub struct JobResult {
    pub job_id: String,
    pub order_id: String,
    pub item_id: String,
    /// Final item status, `None` when the item had already been triggered.
    pub item_status: Option<ItemStatus>,
    /// Item failure reason or the error that stopped the job.
    pub error: Option<String>,
}

impl JobResult {
    pub fn resolved(job: &ExtractionJob, item: &Item) -> Self {
        Self {
            job_id: job.id.clone(),
            order_id: job.order_id.clone(),
            item_id: job.item_id.clone(),
            item_status: Some(item.status()),
            error: item.error_message().map(String::from),
        }
    }

    pub fn skipped(job: &ExtractionJob) -> Self {
        Self {
            job_id: job.id.clone(),
            order_id: job.order_id.clone(),
            item_id: job.item_id.clone(),
            item_status: None,
            error: None,
        }
    }

    pub fn failure(job: &ExtractionJob, error: String) -> Self {
        Self {
            job_id: job.id.clone(),
            order_id: job.order_id.clone(),
            item_id: job.item_id.clone(),
            item_status: None,
            error: Some(error),
        }
    }

    pub fn success(&self) -> bool {
        self.item_status == Some(ItemStatus::Completed)
    }

    pub fn was_skipped(&self) -> bool {
        self.item_status.is_none() && self.error.is_none()
    }
}
