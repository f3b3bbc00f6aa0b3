//! Term index over dataset names and metadata.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tabula_types::{ContentKey, DatasetRecord, DatasetRef};
use tracing::debug;

use crate::error::RepoResult;
use crate::persisted::Persisted;
use crate::traits::{window, SearchParams, Searchable};

/// File name of the persisted index inside a repository directory.
pub const SEARCH_INDEX_FILE: &str = "search_index.json";

/// Indexed text for one named dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexEntry {
    pub name: String,
    pub title: String,
    pub description: String,
    pub fields: Vec<String>,
}

impl IndexEntry {
    pub fn new(name: &str, ds: &DatasetRecord) -> Self {
        Self {
            name: name.to_string(),
            title: ds.title.clone(),
            description: ds.description.clone(),
            fields: ds
                .structure
                .as_ref()
                .and_then(|st| st.schema.as_ref())
                .map(|s| s.field_names().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }

    /// Hits for `term`. The name counts double.
    fn score(&self, term: &str) -> usize {
        let hit = |s: &str| usize::from(s.to_lowercase().contains(term));
        2 * hit(&self.name)
            + hit(&self.title)
            + hit(&self.description)
            + self.fields.iter().map(|f| hit(f)).sum::<usize>()
    }
}

/// Ranked search over [`IndexEntry`]s keyed by dataset path.
pub struct SearchIndex {
    entries: Persisted<BTreeMap<ContentKey, IndexEntry>>,
}

impl SearchIndex {
    pub fn in_memory() -> Self {
        Self {
            entries: Persisted::in_memory(BTreeMap::new()),
        }
    }

    pub fn open(file: impl Into<PathBuf>) -> RepoResult<Self> {
        Ok(Self {
            entries: Persisted::open(file)?,
        })
    }

    /// Replace the whole index.
    pub fn replace(&self, entries: BTreeMap<ContentKey, IndexEntry>) -> RepoResult<()> {
        let n = entries.len();
        self.entries.update(|current| {
            *current = entries;
            Ok(())
        })?;
        debug!(entries = n, "rebuilt search index");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read(BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Searchable for SearchIndex {
    fn search(&self, params: &SearchParams) -> RepoResult<Vec<DatasetRef>> {
        let terms: Vec<String> = params
            .query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits: Vec<(usize, DatasetRef)> = self.entries.read(|entries| {
            entries
                .iter()
                .filter_map(|(path, entry)| {
                    let score: usize = terms.iter().map(|t| entry.score(t)).sum();
                    (score > 0).then(|| (score, DatasetRef::new(entry.name.clone(), path.clone())))
                })
                .collect()
        });
        hits.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
        Ok(window(
            hits.into_iter().map(|(_, r)| r),
            params.limit,
            params.offset,
        ))
    }
}

/// A repository's optional index, loaded lazily.
///
/// A file-backed slot attaches the index the first time it is asked for if
/// `search_index.json` exists; an in-memory slot has no index until one is
/// built.
pub struct IndexSlot {
    dir: Option<PathBuf>,
    index: Mutex<Option<Arc<SearchIndex>>>,
}

impl IndexSlot {
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            index: Mutex::new(None),
        }
    }

    pub fn open(dir: &Path) -> Self {
        Self {
            dir: Some(dir.to_path_buf()),
            index: Mutex::new(None),
        }
    }

    /// The attached index, if any.
    pub fn get(&self) -> RepoResult<Option<Arc<SearchIndex>>> {
        let mut slot = self.index.lock().expect("lock poisoned");
        if slot.is_none() {
            if let Some(file) = self.file().filter(|f| f.exists()) {
                debug!(file = %file.display(), "loading search index");
                *slot = Some(Arc::new(SearchIndex::open(file)?));
            }
        }
        Ok(slot.clone())
    }

    /// Replace the index contents, creating the index if needed.
    pub fn rebuild(&self, entries: BTreeMap<ContentKey, IndexEntry>) -> RepoResult<()> {
        let mut slot = self.index.lock().expect("lock poisoned");
        if slot.is_none() {
            let index = match self.file() {
                Some(file) => SearchIndex::open(file)?,
                None => SearchIndex::in_memory(),
            };
            *slot = Some(Arc::new(index));
        }
        match slot.as_ref() {
            Some(index) => index.replace(entries),
            None => Ok(()),
        }
    }

    fn file(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(SEARCH_INDEX_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_types::{Field, FieldType, Schema, Structure};
    use tempfile::TempDir;

    fn entries() -> BTreeMap<ContentKey, IndexEntry> {
        let movies = DatasetRecord {
            title: "Movie durations".into(),
            structure: Some(Structure {
                schema: Some(Schema {
                    fields: vec![
                        Field::new("movie_title", FieldType::String),
                        Field::new("duration", FieldType::Integer),
                    ],
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let cities = DatasetRecord {
            title: "Cities".into(),
            description: "population of a few cities, some with movie theatres".into(),
            ..Default::default()
        };
        BTreeMap::from([
            (ContentKey::new("/map/a"), IndexEntry::new("movies", &movies)),
            (ContentKey::new("/map/b"), IndexEntry::new("cities", &cities)),
        ])
    }

    #[test]
    fn ranks_name_hits_first() {
        let index = SearchIndex::in_memory();
        index.replace(entries()).unwrap();
        let res = index
            .search(&SearchParams {
                query: "movie".into(),
                ..Default::default()
            })
            .unwrap();
        let names: Vec<_> = res.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["movies", "cities"]);
        assert_eq!(res[0].path, ContentKey::new("/map/a"));
    }

    #[test]
    fn empty_query_matches_nothing() {
        let index = SearchIndex::in_memory();
        index.replace(entries()).unwrap();
        assert!(index.search(&SearchParams::default()).unwrap().is_empty());
    }

    #[test]
    fn slot_loads_existing_file() {
        let dir = TempDir::new().unwrap();
        let slot = IndexSlot::open(dir.path());
        assert!(slot.get().unwrap().is_none());
        slot.rebuild(entries()).unwrap();

        let reopened = IndexSlot::open(dir.path());
        let index = reopened.get().unwrap().unwrap();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn memory_slot_starts_empty() {
        let slot = IndexSlot::in_memory();
        assert!(slot.get().unwrap().is_none());
        slot.rebuild(entries()).unwrap();
        assert!(!slot.get().unwrap().unwrap().is_empty());
    }
}
