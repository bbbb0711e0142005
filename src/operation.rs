//! Fixed set of server operations and their endpoints.

/// How a successful response body is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseKind {
    /// Always a binary archive.
    Archive,
    /// Archive, or a JSON list of `{filename, content}` records.
    ArchiveOrStructured,
}

/// One server capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    GenerateImageNotes,
    TranscribeVideo,
    GenerateSummary,
    ExtractSourceCode,
    GenerateWorkflow,
    GenerateAll,
}

impl Operation {
    /// Display order of the action grid.
    pub const ALL: [Operation; 6] = [
        Operation::ExtractSourceCode,
        Operation::GenerateWorkflow,
        Operation::TranscribeVideo,
        Operation::GenerateSummary,
        Operation::GenerateImageNotes,
        Operation::GenerateAll,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::GenerateImageNotes => "Generate Image Notes",
            Self::TranscribeVideo => "Transcribe Video",
            Self::GenerateSummary => "Generate Summary",
            Self::ExtractSourceCode => "Extract Source Code",
            Self::GenerateWorkflow => "Generate Workflow",
            Self::GenerateAll => "Generate All",
        }
    }

    /// Path suffix appended to the configured base URL.
    pub fn path(self) -> &'static str {
        match self {
            Self::GenerateImageNotes => "/generate_notes/",
            Self::TranscribeVideo => "/transcribe_video/",
            Self::GenerateSummary => "/summarize_video/",
            Self::ExtractSourceCode => "/extract_source_code/",
            Self::GenerateWorkflow => "/extract_workflow/",
            Self::GenerateAll => "/generate_all/",
        }
    }

    pub fn response_kind(self) -> ResponseKind {
        match self {
            Self::TranscribeVideo | Self::GenerateSummary => ResponseKind::ArchiveOrStructured,
            _ => ResponseKind::Archive,
        }
    }

    /// Stem of the default download name.
    pub fn download_stem(self) -> &'static str {
        match self {
            Self::GenerateImageNotes => "generated_note",
            Self::TranscribeVideo => "generated_transcription",
            Self::GenerateSummary => "generated_summary",
            Self::ExtractSourceCode => "extracted_source_code",
            Self::GenerateWorkflow => "generated_workflow",
            Self::GenerateAll => "all_results",
        }
    }

    pub fn archive_file_name(self) -> String {
        format!("{}.zip", self.download_stem())
    }

    /// Name of the combined text unit for structured results.
    pub fn combined_file_name(self) -> String {
        format!("{}.txt", self.download_stem())
    }

    /// Full endpoint URL for the given base.
    pub fn endpoint(self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.path())
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
