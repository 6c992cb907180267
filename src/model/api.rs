use chrono::NaiveDateTime;
use rocket::serde::{Deserialize, Serialize};

use crate::model::node_types::{ApprovalStatus, EvidenceStatus, NodeType, ProcessStatus};
use crate::model::repository::{
    Evidence, EvidenceStatistics, MimeTypeStatistics, Node, NodeKind,
};

/// a file or folder as clients see it. File-only and folder-only fields are left out for the other type
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct NodeApi {
    pub id: u32,
    #[serde(rename = "evidenceId")]
    pub evidence_id: u32,
    #[serde(rename = "parentFolder")]
    pub parent_folder: Option<u32>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub name: String,
    #[serde(rename = "uploadedBy")]
    pub uploaded_by: u32,
    #[serde(rename = "uploadedAt")]
    pub uploaded_at: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileApi>,
    #[serde(rename = "folderMetadata", skip_serializing_if = "Option::is_none")]
    pub folder_metadata: Option<FolderMetadataApi>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct FileApi {
    pub size: u64,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub extension: String,
    #[serde(rename = "approvalStatus")]
    pub approval_status: ApprovalStatus,
    #[serde(rename = "reviewedBy")]
    pub reviewed_by: Option<u32>,
    #[serde(rename = "reviewedAt")]
    pub reviewed_at: Option<NaiveDateTime>,
    #[serde(rename = "rejectionReason")]
    pub rejection_reason: Option<String>,
    #[serde(rename = "processStatus")]
    pub process_status: ProcessStatus,
    pub summary: Option<String>,
    #[serde(rename = "hasExtractedContent")]
    pub has_extracted_content: bool,
    #[serde(rename = "vectorId")]
    pub vector_id: Option<String>,
    #[serde(rename = "downloadCount")]
    pub download_count: u32,
    #[serde(rename = "lastDownloaded")]
    pub last_downloaded: Option<NaiveDateTime>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct FolderMetadataApi {
    #[serde(rename = "fileCount")]
    pub file_count: u64,
    #[serde(rename = "totalSize")]
    pub total_size: u64,
    #[serde(rename = "lastModified")]
    pub last_modified: Option<NaiveDateTime>,
}

/// a node along with everything beneath it
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct TreeNodeApi {
    #[serde(flatten)]
    pub node: NodeApi,
    pub children: Vec<TreeNodeApi>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct EvidenceApi {
    pub id: u32,
    pub code: String,
    pub name: String,
    #[serde(rename = "criteriaId")]
    pub criteria_id: u32,
    pub status: EvidenceStatus,
    pub touched: bool,
    /// every node in the evidence tree, at any depth
    pub files: Vec<u32>,
    #[serde(rename = "createdAt")]
    pub created_at: NaiveDateTime,
    #[serde(rename = "updatedAt")]
    pub updated_at: NaiveDateTime,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct StatisticsApi {
    #[serde(rename = "totalFiles")]
    pub total_files: u64,
    #[serde(rename = "totalFolders")]
    pub total_folders: u64,
    #[serde(rename = "totalSize")]
    pub total_size: u64,
    #[serde(rename = "totalDownloads")]
    pub total_downloads: u64,
    #[serde(rename = "typeStats")]
    pub type_stats: Vec<MimeTypeStatisticsApi>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct MimeTypeStatisticsApi {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub count: u64,
    #[serde(rename = "totalSize")]
    pub total_size: u64,
}

/// what a caller gets back after a processing job is handed off. The job's outcome shows up later
/// on the file's `processStatus`
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(crate = "rocket::serde")]
pub struct JobTicket {
    #[serde(rename = "jobId")]
    pub job_id: u64,
    #[serde(rename = "fileId")]
    pub file_id: u32,
    /// which claim of the file this job belongs to. Only that claim's results are stored
    pub run: u32,
}

/// a freshly uploaded file and the processing job it kicked off, if one could be dispatched
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct UploadApi {
    #[serde(flatten)]
    pub node: NodeApi,
    pub job: Option<JobTicket>,
}

/// result of a full-tree repair of cached folder aggregates
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(crate = "rocket::serde")]
pub struct ReconcileApi {
    #[serde(rename = "foldersChecked")]
    pub folders_checked: u32,
    #[serde(rename = "foldersRepaired")]
    pub folders_repaired: u32,
}

impl From<Node> for NodeApi {
    fn from(value: Node) -> Self {
        let node_type = value.node_type();
        let (file, folder_metadata) = match value.kind {
            NodeKind::File(file) => (
                Some(FileApi {
                    size: file.size,
                    mime_type: file.mime_type,
                    extension: file.extension,
                    approval_status: file.review.status,
                    reviewed_by: file.review.reviewed_by,
                    reviewed_at: file.review.review_date,
                    rejection_reason: file.review.rejection_reason,
                    process_status: file.process_status,
                    summary: file.summary,
                    has_extracted_content: file.extracted_content.is_some(),
                    vector_id: file.vector_id,
                    download_count: file.download_count,
                    last_downloaded: file.last_downloaded,
                }),
                None,
            ),
            NodeKind::Folder(folder) => (
                None,
                Some(FolderMetadataApi {
                    file_count: folder.file_count,
                    total_size: folder.total_size,
                    last_modified: folder.last_modified,
                }),
            ),
        };
        Self {
            id: value.id,
            evidence_id: value.evidence_id,
            parent_folder: value.parent_id,
            node_type,
            name: value.name,
            uploaded_by: value.uploaded_by,
            uploaded_at: value.upload_date,
            file,
            folder_metadata,
        }
    }
}

impl EvidenceApi {
    pub fn from_with_files(evidence: Evidence, files: Vec<u32>) -> Self {
        Self {
            id: evidence.id,
            code: evidence.code,
            name: evidence.name,
            criteria_id: evidence.criteria_id,
            status: evidence.status,
            touched: evidence.touched,
            files,
            created_at: evidence.create_date,
            updated_at: evidence.update_date,
        }
    }
}

impl StatisticsApi {
    pub fn from_parts(totals: EvidenceStatistics, type_stats: Vec<MimeTypeStatistics>) -> Self {
        Self {
            total_files: totals.total_files,
            total_folders: totals.total_folders,
            total_size: totals.total_size,
            total_downloads: totals.total_downloads,
            type_stats: type_stats
                .into_iter()
                .map(|s| MimeTypeStatisticsApi {
                    mime_type: s.mime_type,
                    count: s.count,
                    total_size: s.total_size,
                })
                .collect(),
        }
    }
}
