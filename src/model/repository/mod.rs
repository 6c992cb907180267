use chrono::NaiveDateTime;

use super::node_types::{ApprovalStatus, EvidenceStatus, NodeType, ProcessStatus};

/// a row of the Nodes table. Whether it's a file or a folder decides which half of the columns mean anything,
/// so that half lives in [`NodeKind`]
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: u32,
    pub evidence_id: u32,
    /// `None` for nodes at the root of their evidence tree
    pub parent_id: Option<u32>,
    pub name: String,
    /// the user that uploaded the file or created the folder
    pub uploaded_by: u32,
    pub upload_date: NaiveDateTime,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    File(FileAttributes),
    Folder(FolderMetadata),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileAttributes {
    pub size: u64,
    pub mime_type: String,
    /// lowercase, including the leading `.`. Empty if the name has no extension
    pub extension: String,
    /// where the bytes live in the blob store
    pub storage_handle: String,
    pub review: Review,
    pub process_status: ProcessStatus,
    pub extracted_content: Option<String>,
    pub summary: Option<String>,
    /// key of this file's entry in the external vector index
    pub vector_id: Option<String>,
    pub download_count: u32,
    pub last_downloaded: Option<NaiveDateTime>,
}

/// cached aggregate over every file beneath a folder. Never authoritative, always recomputable from the tree
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FolderMetadata {
    pub file_count: u64,
    pub total_size: u64,
    pub last_modified: Option<NaiveDateTime>,
}

/// the approval state of a file along with who set it
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub status: ApprovalStatus,
    pub reviewed_by: Option<u32>,
    pub review_date: Option<NaiveDateTime>,
    /// only present when the file is rejected
    pub rejection_reason: Option<String>,
}

/// everything needed to insert a new file row
#[derive(Debug, Clone)]
pub struct NewFile {
    pub evidence_id: u32,
    pub parent_id: Option<u32>,
    pub name: String,
    pub uploaded_by: u32,
    pub upload_date: NaiveDateTime,
    pub size: u64,
    pub mime_type: String,
    pub extension: String,
    pub storage_handle: String,
    pub review: Review,
}

#[derive(Debug, Clone)]
pub struct NewFolder {
    pub evidence_id: u32,
    pub parent_id: Option<u32>,
    pub name: String,
    pub created_by: u32,
    pub create_date: NaiveDateTime,
}

/// a row of the Evidence table
#[derive(Debug, Clone, PartialEq)]
pub struct Evidence {
    pub id: u32,
    /// e.g. `H1.01.02.04`
    pub code: String,
    pub name: String,
    /// the criteria this evidence proves, used for scoping permissions
    pub criteria_id: u32,
    pub status: EvidenceStatus,
    /// whether anyone has started working on this evidence
    pub touched: bool,
    pub create_date: NaiveDateTime,
    pub update_date: NaiveDateTime,
}

/// one row of [`crate::repository::node_repository::get_child_aggregates`]
#[derive(Debug, Clone, PartialEq)]
pub struct ChildAggregate {
    pub node_type: NodeType,
    pub size: u64,
    pub file_count: u64,
    pub total_size: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvidenceStatistics {
    pub total_files: u64,
    pub total_folders: u64,
    pub total_size: u64,
    pub total_downloads: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MimeTypeStatistics {
    pub mime_type: String,
    pub count: u64,
    pub total_size: u64,
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::File(_) => NodeType::File,
            NodeKind::Folder(_) => NodeType::Folder,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder(_))
    }

    pub fn as_file(&self) -> Option<&FileAttributes> {
        match &self.kind {
            NodeKind::File(file) => Some(file),
            NodeKind::Folder(_) => None,
        }
    }

    pub fn as_folder(&self) -> Option<&FolderMetadata> {
        match &self.kind {
            NodeKind::Folder(folder) => Some(folder),
            NodeKind::File(_) => None,
        }
    }
}

impl Review {
    pub fn pending() -> Self {
        Self {
            status: ApprovalStatus::Pending,
            reviewed_by: None,
            review_date: None,
            rejection_reason: None,
        }
    }
}
