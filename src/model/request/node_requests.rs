use once_cell::sync::Lazy;
use regex::Regex;
use rocket::fs::TempFile;
use rocket::serde::{Deserialize, Serialize};

//language=RegExp
static RESERVED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new("^(CON|PRN|AUX|NUL|COM[1-9]|LPT[1-9])$").expect("valid regex"));
//language=RegExp
static BANNED_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new("[/\\\\<>|:&;#?*\\x00-\\x1f]").expect("valid regex"));

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(crate = "rocket::serde")]
pub struct CreateFolderRequest {
    pub name: String,
    /// leave blank for the root of the evidence tree
    #[serde(rename = "parentId")]
    pub parent_id: Option<u32>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(crate = "rocket::serde")]
pub struct RenameNodeRequest {
    pub name: String,
}

/// where a node should be moved to. `"root"` (or leaving it blank) means the root of the evidence tree
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct MoveNodeRequest {
    #[serde(rename = "targetFolderId")]
    pub target_folder_id: Option<String>,
}

/// parsed form of [`MoveNodeRequest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTarget {
    Root,
    Folder(u32),
}

#[derive(FromForm)]
pub struct UploadFileRequest<'a> {
    /// the file being uploaded
    pub file: TempFile<'a>,
    /// leave blank for the root of the evidence tree.
    /// Kept as a string because numeric multipart fields are unreliable across clients
    #[field(name = "parentFolderId")]
    pub parent_folder_id: Option<String>,
}

/// metadata for a file being uploaded, separate from its bytes
#[derive(Debug, Clone, PartialEq)]
pub struct NewUpload {
    pub evidence_id: u32,
    pub parent_id: Option<u32>,
    /// the name the client sent, unsanitized
    pub name: String,
    pub mime_type: String,
}

impl MoveNodeRequest {
    /// returns `None` if the target is neither `root` nor a folder id
    pub fn target(&self) -> Option<MoveTarget> {
        match self.target_folder_id.as_deref().map(str::trim) {
            None | Some("") | Some("root") => Some(MoveTarget::Root),
            Some(id) => id.parse::<u32>().ok().map(MoveTarget::Folder),
        }
    }
}

impl UploadFileRequest<'_> {
    /// `Ok(None)` for the root folder, `Err` if the client sent something that isn't an id
    pub fn parent_id(&self) -> Result<Option<u32>, ()> {
        match self.parent_folder_id.as_deref().map(str::trim) {
            None | Some("") | Some("root") => Ok(None),
            Some(id) => id.parse::<u32>().map(Some).map_err(|_| ()),
        }
    }
}

/// returns a sanitized node name based on [Rocket's file name sanitization](https://api.rocket.rs/master/rocket/fs/struct.FileName.html#sanitization),
/// but keeps the characters that are common in document names (spaces, parentheses, non-ascii letters).
/// Will return None if the entire name is unsafe
pub fn sanitize_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || RESERVED_NAME.is_match(&trimmed.to_uppercase())
        || trimmed.starts_with("..")
        || trimmed.contains("./")
    {
        return None;
    }
    let replaced = BANNED_CHARS.replace_all(trimmed, "").trim().to_string();
    if replaced.is_empty() || replaced == "." {
        None
    } else {
        Some(replaced)
    }
}

/// the lowercase extension of `name`, including the `.`, or an empty string if there isn't one
pub fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(0) | None => String::new(),
        Some(index) => name[index..].to_lowercase(),
    }
}
