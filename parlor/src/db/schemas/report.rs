//! Report document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::user::parse_id;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::models::{Report, StoredReport};
use crate::types::Result;

/// Collection name for reports
pub const REPORT_COLLECTION: &str = "reports";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ReportDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub report_id: String,

    /// One report per conversation, enforced by a unique index
    pub conversation_id: String,

    pub report_data: Report,
}

impl ReportDoc {
    pub fn from_report(report: &StoredReport) -> Self {
        Self {
            _id: None,
            metadata: Metadata::created(report.created_at),
            report_id: report.id.to_string(),
            conversation_id: report.conversation_id.to_string(),
            report_data: report.data.clone(),
        }
    }

    pub fn into_report(self) -> Result<StoredReport> {
        Ok(StoredReport {
            id: parse_id(&self.report_id)?,
            conversation_id: parse_id(&self.conversation_id)?,
            created_at: self.metadata.created_at_utc(),
            data: self.report_data,
        })
    }
}

impl IntoIndexes for ReportDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "conversation_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("conversation_id_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ReportDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
