//! Seek pagination and folder filtering
//!
//! Pages are ordered newest first by `(created, id)`. A cursor marks the
//! boundary row of the page it came from and the direction to move in.
//! Backends fetch `limit + 1` rows past the cursor in query order and hand
//! them to [`SeekPage::from_rows`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::FolderId;
use crate::CoreError;

/// Reserved folder value meaning "flows without a folder"
pub const NO_FOLDER_SENTINEL: &str = "NULL";

/// Default page size
pub const DEFAULT_LIMIT: usize = 10;

/// Largest page size accepted
pub const MAX_LIMIT: usize = 100;

/// Folder filter for list and count
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FolderFilter {
    /// No filtering
    #[default]
    Any,

    /// Only flows without a folder
    None,

    /// Only flows in the given folder
    Specific(FolderId),
}

impl FolderFilter {
    /// Interpret the `folderId` query parameter
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            None => FolderFilter::Any,
            Some(NO_FOLDER_SENTINEL) => FolderFilter::None,
            Some(id) => FolderFilter::Specific(FolderId::from(id)),
        }
    }

    /// Whether a flow placed in `folder_id` passes the filter
    pub fn matches(&self, folder_id: Option<&FolderId>) -> bool {
        match self {
            FolderFilter::Any => true,
            FolderFilter::None => folder_id.is_none(),
            FolderFilter::Specific(id) => folder_id == Some(id),
        }
    }
}

/// Direction a cursor moves in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorDirection {
    /// Older rows
    #[serde(rename = "n")]
    Next,

    /// Newer rows
    #[serde(rename = "p")]
    Previous,
}

/// Decoded cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Direction to move in
    #[serde(rename = "d")]
    pub direction: CursorDirection,

    /// `created` of the boundary row
    #[serde(rename = "c")]
    pub created: DateTime<Utc>,

    /// `id` of the boundary row
    #[serde(rename = "i")]
    pub id: String,
}

impl Cursor {
    /// Opaque string form handed to clients
    pub fn encode(&self) -> String {
        // Serializing a struct of plain fields cannot fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        base64::encode_config(json, base64::URL_SAFE_NO_PAD)
    }

    /// Parse a client supplied cursor
    pub fn decode(value: &str) -> Result<Self, CoreError> {
        let bytes = base64::decode_config(value, base64::URL_SAFE_NO_PAD)
            .map_err(|e| CoreError::Validation(format!("Invalid cursor: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::Validation(format!("Invalid cursor: {}", e)))
    }

    /// Whether a row lies strictly past this cursor in its direction
    pub fn admits(&self, created: DateTime<Utc>, id: &str) -> bool {
        let key = (created, id);
        let boundary = (self.created, self.id.as_str());
        match self.direction {
            CursorDirection::Next => key < boundary,
            CursorDirection::Previous => key > boundary,
        }
    }
}

/// Page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Cursor from a previous page, `None` for the first page
    pub cursor: Option<Cursor>,

    /// Page size
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            cursor: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    /// Build from raw query values, clamping the limit
    pub fn from_query(cursor: Option<&str>, limit: Option<usize>) -> Result<Self, CoreError> {
        let cursor = match cursor {
            Some(raw) if !raw.is_empty() => Some(Cursor::decode(raw)?),
            _ => None,
        };
        Ok(Self {
            cursor,
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        })
    }

    /// Direction the backend must scan in
    pub fn direction(&self) -> CursorDirection {
        self.cursor
            .as_ref()
            .map_or(CursorDirection::Next, |cursor| cursor.direction)
    }

    /// Rows to fetch: one extra to detect another page
    pub fn fetch_limit(&self) -> usize {
        self.limit + 1
    }
}

/// One page of results, newest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeekPage<T> {
    /// Rows
    pub data: Vec<T>,

    /// Cursor to older rows
    pub next: Option<String>,

    /// Cursor to newer rows
    pub previous: Option<String>,
}

impl<T> SeekPage<T> {
    /// Assemble a page from rows fetched in scan order
    ///
    /// `rows` holds up to `fetch_limit()` rows past the cursor: descending
    /// for `Next` (or no cursor), ascending for `Previous`.
    pub fn from_rows<F>(mut rows: Vec<T>, page: &PageRequest, key: F) -> Self
    where
        F: Fn(&T) -> (DateTime<Utc>, String),
    {
        let has_more = rows.len() > page.limit;
        rows.truncate(page.limit);

        let direction = page.direction();
        if direction == CursorDirection::Previous {
            rows.reverse();
        }

        let cursor_at = |row: Option<&T>, direction: CursorDirection| {
            row.map(|row| {
                let (created, id) = key(row);
                Cursor {
                    direction,
                    created,
                    id,
                }
                .encode()
            })
        };

        let (next, previous) = match (direction, page.cursor.is_some()) {
            (CursorDirection::Next, false) => (
                has_more.then(|| cursor_at(rows.last(), CursorDirection::Next)).flatten(),
                None,
            ),
            (CursorDirection::Next, true) => (
                has_more.then(|| cursor_at(rows.last(), CursorDirection::Next)).flatten(),
                cursor_at(rows.first(), CursorDirection::Previous),
            ),
            (CursorDirection::Previous, _) => (
                cursor_at(rows.last(), CursorDirection::Next),
                has_more.then(|| cursor_at(rows.first(), CursorDirection::Previous)).flatten(),
            ),
        };

        Self {
            data: rows,
            next,
            previous,
        }
    }

    /// Paginate an unordered in-memory collection
    pub fn select<F>(mut items: Vec<T>, page: &PageRequest, key: F) -> Self
    where
        F: Fn(&T) -> (DateTime<Utc>, String),
    {
        items.sort_by(|a, b| key(b).cmp(&key(a)));
        if page.direction() == CursorDirection::Previous {
            items.reverse();
        }

        let rows: Vec<T> = items
            .into_iter()
            .filter(|item| match &page.cursor {
                Some(cursor) => {
                    let (created, id) = key(item);
                    cursor.admits(created, &id)
                }
                None => true,
            })
            .take(page.fetch_limit())
            .collect();

        Self::from_rows(rows, page, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: String,
        created: DateTime<Utc>,
    }

    fn rows(count: i64) -> Vec<Row> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| Row {
                id: format!("row-{:02}", i),
                created: base + Duration::minutes(i),
            })
            .collect()
    }

    fn key(row: &Row) -> (DateTime<Utc>, String) {
        (row.created, row.id.clone())
    }

    fn ids(page: &SeekPage<Row>) -> Vec<&str> {
        page.data.iter().map(|r| r.id.as_str()).collect()
    }

    fn follow(cursor: &Option<String>, limit: usize) -> PageRequest {
        PageRequest::from_query(cursor.as_deref(), Some(limit)).unwrap()
    }

    #[test]
    fn test_folder_filter_from_query() {
        assert_eq!(FolderFilter::from_query(None), FolderFilter::Any);
        assert_eq!(FolderFilter::from_query(Some("NULL")), FolderFilter::None);
        assert_eq!(
            FolderFilter::from_query(Some("f-1")),
            FolderFilter::Specific(FolderId::from("f-1"))
        );
    }

    #[test]
    fn test_folder_filter_matches() {
        let folder = FolderId::from("f-1");
        assert!(FolderFilter::Any.matches(None));
        assert!(FolderFilter::None.matches(None));
        assert!(!FolderFilter::None.matches(Some(&folder)));
        assert!(FolderFilter::Specific(folder.clone()).matches(Some(&folder)));
        assert!(!FolderFilter::Specific(folder).matches(None));
    }

    #[test]
    fn test_walks_forward_and_back() {
        let all = rows(5);

        let first = SeekPage::select(all.clone(), &follow(&None, 2), key);
        assert_eq!(ids(&first), vec!["row-04", "row-03"]);
        assert!(first.previous.is_none());

        let second = SeekPage::select(all.clone(), &follow(&first.next, 2), key);
        assert_eq!(ids(&second), vec!["row-02", "row-01"]);

        let last = SeekPage::select(all.clone(), &follow(&second.next, 2), key);
        assert_eq!(ids(&last), vec!["row-00"]);
        assert!(last.next.is_none());

        let back = SeekPage::select(all.clone(), &follow(&last.previous, 2), key);
        assert_eq!(ids(&back), vec!["row-02", "row-01"]);

        let front = SeekPage::select(all, &follow(&back.previous, 2), key);
        assert_eq!(ids(&front), vec!["row-04", "row-03"]);
        assert!(front.previous.is_none());
        assert!(front.next.is_some());
    }

    #[test]
    fn test_limit_is_clamped_and_bad_cursor_rejected() {
        assert_eq!(PageRequest::from_query(None, Some(0)).unwrap().limit, 1);
        assert_eq!(PageRequest::from_query(None, Some(1000)).unwrap().limit, MAX_LIMIT);
        assert!(matches!(
            PageRequest::from_query(Some("%%%"), None),
            Err(CoreError::Validation(_))
        ));
    }
}
