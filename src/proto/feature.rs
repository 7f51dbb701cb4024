/// Protocol revision spoken by this crate.
pub const PROTOCOL_VERSION: u64 = 54451;

/// Capability introduced at a protocol revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    TempTables,
    BlockInfo,
    ClientInfo,
    Timezone,
    QuotaKeyInClientInfo,
    DisplayName,
    VersionPatch,
    ClientWriteInfo,
    SettingsSerializedAsStrings,
    InterServerSecret,
    OpenTelemetry,
    XForwardedForInClientInfo,
    RefererInClientInfo,
    DistributedDepth,
    QueryStartTime,
    ProfileEvents,
    ParallelReplicas,
    CustomSerialization,
    Parameters,
    ServerQueryTimeInProgress,
}

impl Feature {
    /// Revision that introduced the feature.
    pub fn version(self) -> u64 {
        match self {
            Feature::TempTables => 50264,
            Feature::BlockInfo => 51903,
            Feature::ClientInfo => 54032,
            Feature::Timezone => 54058,
            Feature::QuotaKeyInClientInfo => 54060,
            Feature::DisplayName => 54372,
            Feature::VersionPatch => 54401,
            Feature::ClientWriteInfo => 54420,
            Feature::SettingsSerializedAsStrings => 54429,
            Feature::InterServerSecret => 54441,
            Feature::OpenTelemetry => 54442,
            Feature::XForwardedForInClientInfo => 54443,
            Feature::RefererInClientInfo => 54447,
            Feature::DistributedDepth => 54448,
            Feature::QueryStartTime => 54449,
            Feature::ProfileEvents => 54451,
            Feature::ParallelReplicas => 54453,
            Feature::CustomSerialization => 54454,
            Feature::Parameters => 54459,
            Feature::ServerQueryTimeInProgress => 54460,
        }
    }

    pub fn in_version(self, revision: u64) -> bool {
        revision >= self.version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gates_by_revision() {
        assert!(Feature::Timezone.in_version(PROTOCOL_VERSION));
        assert!(Feature::ProfileEvents.in_version(PROTOCOL_VERSION));
        assert!(!Feature::CustomSerialization.in_version(PROTOCOL_VERSION));
        assert!(!Feature::BlockInfo.in_version(0));
    }
}
