use std::fmt;

/// Remote method ids this client knows how to call.
///
/// Any other id can still be sent as a raw string; this enum only names the
/// ones the artifact, research and notebook helpers rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RpcMethod {
    ListNotebooks,
    GetNotebook,
    CreateNotebook,
    DeleteNotebook,
    ListArtifacts,
    CreateArtifact,
    DeleteArtifact,
    GenerateMindMap,
    StartFastResearch,
    StartDeepResearch,
    PollResearch,
    ImportResearch,
}

impl RpcMethod {
    pub const ALL: [RpcMethod; 12] = [
        RpcMethod::ListNotebooks,
        RpcMethod::GetNotebook,
        RpcMethod::CreateNotebook,
        RpcMethod::DeleteNotebook,
        RpcMethod::ListArtifacts,
        RpcMethod::CreateArtifact,
        RpcMethod::DeleteArtifact,
        RpcMethod::GenerateMindMap,
        RpcMethod::StartFastResearch,
        RpcMethod::StartDeepResearch,
        RpcMethod::PollResearch,
        RpcMethod::ImportResearch,
    ];

    /// Returns the opaque method id used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListNotebooks => "wXbhsf",
            Self::GetNotebook => "rLM1Ne",
            Self::CreateNotebook => "CCqFvf",
            Self::DeleteNotebook => "WWINqb",
            Self::ListArtifacts => "gArtLc",
            Self::CreateArtifact => "R7cb6c",
            Self::DeleteArtifact => "V5N4be",
            Self::GenerateMindMap => "yyryJe",
            Self::StartFastResearch => "Ljjv0c",
            Self::StartDeepResearch => "QA9ei",
            Self::PollResearch => "e3bVqc",
            Self::ImportResearch => "LBwxtb",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.as_str() == id)
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
