//! Packager: merges the per-category batches into the canonical model, the
//! failure report and the summary, and writes the result out.

use std::io::Write;

use backup_envelope::{seal, ContainerHeader, SealSettings};
use serde::Serialize;
use tracing::info;

use crate::convert::Converted;
use crate::error::ExportError;
use crate::model::{
    CanonicalExport, ConversationMembers, DirectConversation, MembershipEvent, NamedConversation,
};
use crate::report::{CategoryCount, ExportSummary, FailureReport};
use crate::source::Platform;

/// Everything one successful export produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOutcome {
    pub platform: Platform,
    pub schema_version: u32,
    pub model: CanonicalExport,
    pub failures: FailureReport,
    pub summary: ExportSummary,
}

/// Combine the four batches. Failures are reported in category order
/// (named, direct, snapshots, events), each in source order.
pub fn assemble(
    platform: Platform,
    schema_version: u32,
    named: Converted<NamedConversation>,
    direct: Converted<DirectConversation>,
    members: Converted<ConversationMembers>,
    events: Converted<MembershipEvent>,
) -> ExportOutcome {
    let summary = ExportSummary {
        named_conversations: count(&named),
        direct_conversations: count(&direct),
        membership_snapshots: count(&members),
        membership_events: count(&events),
    };

    let mut failures = Vec::with_capacity(summary.failed());
    failures.extend(named.failures);
    failures.extend(direct.failures);
    failures.extend(members.failures);
    failures.extend(events.failures);

    let mut model = CanonicalExport {
        named_conversations: named.records,
        direct_conversations: direct.records,
        conversation_members: members.records,
        ..CanonicalExport::default()
    };
    for event in events.records {
        match event {
            MembershipEvent::Added(added) => model.added_members.push(added),
            MembershipEvent::Left(left) => model.left_members.push(left),
        }
    }

    info!(
        %platform,
        schema_version,
        named = summary.named_conversations.converted,
        direct = summary.direct_conversations.converted,
        snapshots = summary.membership_snapshots.converted,
        events = summary.membership_events.converted,
        failed = summary.failed(),
        "export assembled"
    );

    ExportOutcome {
        platform,
        schema_version,
        model,
        failures: FailureReport { failures },
        summary,
    }
}

fn count<T>(batch: &Converted<T>) -> CategoryCount {
    CategoryCount {
        converted: batch.records.len(),
        failed: batch.failures.len(),
    }
}

impl ExportOutcome {
    /// Pretty-printed JSON. Identical inputs give byte-identical output.
    pub fn to_json(&self) -> Result<Vec<u8>, ExportError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Seal the JSON form into a new container.
    pub fn seal_to<W: Write>(
        &self,
        writer: W,
        passphrase: &[u8],
        settings: &SealSettings,
    ) -> Result<ContainerHeader, ExportError> {
        let json = self.to_json()?;
        let header = seal(json.as_slice(), writer, passphrase, settings)?;
        info!(bytes = json.len(), "export sealed");
        Ok(header)
    }
}
