#[derive(PartialEq, Debug)]
pub enum CreateEvidenceError {
    /// the code doesn't look like `H1.01.02.04`
    InvalidCode,
    /// the name is empty or too long
    InvalidName,
    /// another evidence already has this code
    AlreadyExists,
    DbFailure,
}

#[derive(PartialEq, Debug)]
pub enum GetEvidenceError {
    NotFound,
    DbFailure,
}
