#[derive(PartialEq, Debug)]
pub enum CreateNodeError {
    /// the name is empty or made entirely of characters that aren't allowed
    InvalidName,
    /// the requested parent doesn't exist, isn't a folder, or belongs to a different evidence
    InvalidParent,
    /// the evidence the node should belong to doesn't exist
    EvidenceNotFound,
    /// a folder with the same name already exists in the target folder
    AlreadyExists,
    /// the bytes could not be written to the blob store
    BlobFailure,
    DbFailure,
}

#[derive(PartialEq, Debug)]
pub enum GetNodeError {
    NotFound,
    DbFailure,
}

#[derive(PartialEq, Debug)]
pub enum DeleteNodeError {
    NotFound,
    /// folders can only be deleted once they have no children
    NotEmpty,
    DbFailure,
}

#[derive(PartialEq, Debug)]
pub enum MoveNodeError {
    /// the node being moved doesn't exist
    NodeNotFound,
    /// the target doesn't exist, isn't a folder, or is in another evidence tree
    TargetNotFound,
    /// a folder can't be moved into itself
    MoveToSelf,
    /// the target folder is a descendant of the folder being moved
    WouldCreateCycle,
    DbFailure,
}

#[derive(PartialEq, Debug)]
pub enum UpdateNodeError {
    NotFound,
    /// only folders can be renamed
    NotAFolder,
    InvalidName,
    /// a sibling folder already has the new name
    AlreadyExists,
    DbFailure,
}

#[derive(PartialEq, Debug)]
pub enum DownloadFileError {
    NotFound,
    /// folders have no bytes to download
    NotAFile,
    BlobFailure,
    DbFailure,
}

#[derive(PartialEq, Debug)]
pub enum AggregateError {
    /// the parent chain is longer than any legitimate tree could be, meaning the chain loops
    CorruptParentChain,
    DbFailure,
}

#[derive(PartialEq, Debug)]
pub enum SearchFileError {
    /// the date range or size range was malformed
    InvalidFilter,
    DbFailure,
}
