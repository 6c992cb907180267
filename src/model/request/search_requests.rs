use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// every field is optional, and unset fields don't filter anything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSearch {
    pub evidence_id: Option<u32>,
    /// case-insensitive match against the name or the extracted content
    pub keyword: Option<String>,
    /// `folder` for folders only, anything else matches part of a file's mime type
    pub file_type: Option<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub uploaded_by: Option<u32>,
    pub date_from: Option<NaiveDateTime>,
    pub date_to: Option<NaiveDateTime>,
}

/// the raw query string of a search. Dates are either `2024-03-01` or `2024-03-01T12:30:00`
#[derive(FromForm, Debug, Default)]
pub struct SearchFilesQuery {
    #[field(name = "evidenceId")]
    pub evidence_id: Option<u32>,
    pub keyword: Option<String>,
    #[field(name = "type")]
    pub file_type: Option<String>,
    #[field(name = "minSize")]
    pub min_size: Option<u64>,
    #[field(name = "maxSize")]
    pub max_size: Option<u64>,
    #[field(name = "uploadedBy")]
    pub uploaded_by: Option<u32>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl TryFrom<SearchFilesQuery> for FileSearch {
    /// the name of the date parameter that couldn't be parsed
    type Error = &'static str;

    fn try_from(value: SearchFilesQuery) -> Result<Self, Self::Error> {
        let date_from = match value.from.as_deref() {
            Some(raw) => Some(parse_date(raw, NaiveTime::MIN).ok_or("from")?),
            None => None,
        };
        // a bare day as the upper bound includes that whole day
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        let date_to = match value.to.as_deref() {
            Some(raw) => Some(parse_date(raw, end_of_day).ok_or("to")?),
            None => None,
        };
        Ok(Self {
            evidence_id: value.evidence_id,
            keyword: value.keyword.filter(|k| !k.trim().is_empty()),
            file_type: value.file_type.filter(|t| !t.trim().is_empty()),
            min_size: value.min_size,
            max_size: value.max_size,
            uploaded_by: value.uploaded_by,
            date_from,
            date_to,
        })
    }
}

fn parse_date(raw: &str, time_if_missing: NaiveTime) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|day| day.and_time(time_if_missing))
        })
}
