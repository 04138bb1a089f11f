//! Music library loaded from CSV and emotion-based song selection.

use crate::types::Emotion;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::path::Path;
use thiserror::Error;

/// Maximum number of songs returned per recommendation.
pub const MAX_RECOMMENDATIONS: usize = 5;
/// Column holding each song's emotion id (0–6).
pub const EMOTION_ID_COLUMN: &str = "emotion_id";

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
}

/// One library row: every CSV column, in file order, with inferred types.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Song {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip)]
    emotion_id: Option<i64>,
}

impl Song {
    pub fn emotion_id(&self) -> Option<i64> {
        self.emotion_id
    }
}

/// How a recommendation was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Songs whose emotion id matches the requested emotion.
    Filtered,
    /// Library has no emotion id column; songs drawn from the whole table.
    Unfiltered,
    /// Library failed to load or has no rows.
    EmptyLibrary,
}

#[derive(Debug, Clone)]
pub struct Recommendation {
    pub songs: Vec<Song>,
    pub selection: Selection,
}

/// Read-only song table shared by all requests.
#[derive(Debug, Clone, Default)]
pub struct MusicLibrary {
    songs: Vec<Song>,
    has_category_column: bool,
}

impl MusicLibrary {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a library from a CSV file with a header row.
    pub fn load(path: &Path) -> Result<Self, LibraryError> {
        let reader = csv::Reader::from_path(path)?;
        Self::from_csv(reader)
    }

    /// Parse a library from any CSV source with a header row.
    pub fn from_reader<R: std::io::Read>(source: R) -> Result<Self, LibraryError> {
        Self::from_csv(csv::Reader::from_reader(source))
    }

    fn from_csv<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self, LibraryError> {
        let headers = reader.headers()?.clone();
        let category_idx = headers.iter().position(|h| h == EMOTION_ID_COLUMN);
        let records = reader.records().collect::<Result<Vec<_>, _>>()?;

        // Types are decided per column, from every row, before any cell is converted.
        let kinds: Vec<ColumnKind> = (0..headers.len())
            .map(|idx| infer_kind(records.iter().map(|r| r.get(idx).unwrap_or(""))))
            .collect();

        let songs = records
            .iter()
            .map(|record| {
                let fields: Map<String, Value> = headers
                    .iter()
                    .zip(record.iter())
                    .zip(&kinds)
                    .map(|((name, cell), kind)| (name.to_string(), convert_cell(cell, *kind)))
                    .collect();
                let emotion_id = category_idx
                    .and_then(|idx| record.get(idx))
                    .and_then(parse_category);
                Song { fields, emotion_id }
            })
            .collect();

        Ok(Self {
            songs,
            has_category_column: category_idx.is_some(),
        })
    }

    /// Load the library, degrading to an empty one on any failure.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(library) => {
                tracing::info!(
                    path = %path.display(),
                    songs = library.len(),
                    category_column = library.has_category_column,
                    "music library loaded"
                );
                if !library.has_category_column {
                    tracing::warn!(
                        "music library has no {EMOTION_ID_COLUMN} column; recommendations will ignore the detected emotion"
                    );
                }
                library
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to load music library; serving empty recommendations"
                );
                Self::empty()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn has_category_column(&self) -> bool {
        self.has_category_column
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    /// Up to five random songs for the given emotion.
    pub fn recommend(&self, emotion: Emotion) -> Recommendation {
        self.recommend_with(emotion, &mut rand::thread_rng())
    }

    /// Like [`recommend`](Self::recommend), for a free-form label.
    /// Unknown labels fall back to Neutral.
    pub fn recommend_for_label(&self, label: &str) -> Recommendation {
        let emotion = label.parse().unwrap_or(Emotion::Neutral);
        self.recommend(emotion)
    }

    pub fn recommend_with<R: Rng + ?Sized>(&self, emotion: Emotion, rng: &mut R) -> Recommendation {
        if self.songs.is_empty() {
            return Recommendation {
                songs: Vec::new(),
                selection: Selection::EmptyLibrary,
            };
        }

        if !self.has_category_column {
            let songs = self
                .songs
                .choose_multiple(rng, MAX_RECOMMENDATIONS)
                .cloned()
                .collect();
            return Recommendation {
                songs,
                selection: Selection::Unfiltered,
            };
        }

        let target = i64::from(emotion.id());
        let candidates: Vec<&Song> = self
            .songs
            .iter()
            .filter(|s| s.emotion_id == Some(target))
            .collect();

        let songs = if candidates.len() > MAX_RECOMMENDATIONS {
            candidates
                .choose_multiple(rng, MAX_RECOMMENDATIONS)
                .map(|s| (*s).clone())
                .collect()
        } else {
            candidates.into_iter().cloned().collect()
        };

        Recommendation {
            songs,
            selection: Selection::Filtered,
        }
    }
}

/// Value type shared by every cell of a CSV column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Bool,
    Text,
}

/// Pick one type for a whole column.
///
/// Integers mixed with floats widen to float, and so do integers with blank
/// cells, since a blank has no integer representation. Any other mix makes
/// the column text. A column with only blanks is float (all null).
fn infer_kind<'a>(cells: impl Iterator<Item = &'a str>) -> ColumnKind {
    let mut kind = None;
    let mut has_blank = false;

    for cell in cells {
        if cell.is_empty() {
            has_blank = true;
            continue;
        }
        let cell_kind = if cell.parse::<i64>().is_ok() {
            ColumnKind::Int
        } else if cell.parse::<f64>().is_ok() {
            ColumnKind::Float
        } else if parse_bool(cell).is_some() {
            ColumnKind::Bool
        } else {
            return ColumnKind::Text;
        };

        kind = Some(match (kind, cell_kind) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(ColumnKind::Int), ColumnKind::Float) | (Some(ColumnKind::Float), ColumnKind::Int) => {
                ColumnKind::Float
            }
            _ => return ColumnKind::Text,
        });
    }

    match kind {
        Some(ColumnKind::Int) if has_blank => ColumnKind::Float,
        Some(k) => k,
        None => ColumnKind::Float,
    }
}

/// Empty cells and non-finite floats become null.
fn convert_cell(cell: &str, kind: ColumnKind) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    match kind {
        ColumnKind::Int => cell.parse::<i64>().map_or(Value::Null, Value::from),
        ColumnKind::Float => cell
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number),
        ColumnKind::Bool => parse_bool(cell).map_or(Value::Null, Value::Bool),
        ColumnKind::Text => Value::String(cell.to_string()),
    }
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell {
        "True" | "TRUE" | "true" => Some(true),
        "False" | "FALSE" | "false" => Some(false),
        _ => None,
    }
}

/// Emotion ids may be written as `3` or `3.0`.
fn parse_category(cell: &str) -> Option<i64> {
    let cell = cell.trim();
    if let Ok(i) = cell.parse::<i64>() {
        return Some(i);
    }
    let f = cell.parse::<f64>().ok()?;
    (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    const HEADER: &str = "track_id,name,artist,emotion_id\n";

    fn library_with(rows: &[(&str, i64)]) -> MusicLibrary {
        let mut csv = HEADER.to_string();
        for (name, id) in rows {
            csv.push_str(&format!("{name},{name} song,Some Artist,{id}\n"));
        }
        MusicLibrary::from_reader(csv.as_bytes()).unwrap()
    }

    fn track_ids(rec: &Recommendation) -> Vec<String> {
        rec.songs
            .iter()
            .map(|s| s.fields["track_id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_empty_library() {
        let rec = MusicLibrary::empty().recommend(Emotion::Happy);
        assert!(rec.songs.is_empty());
        assert_eq!(rec.selection, Selection::EmptyLibrary);
    }

    #[test]
    fn test_header_only_library_is_empty() {
        let lib = MusicLibrary::from_reader(HEADER.as_bytes()).unwrap();
        assert!(lib.is_empty());
        assert!(lib.has_category_column());
        assert_eq!(lib.recommend(Emotion::Sad).selection, Selection::EmptyLibrary);
    }

    #[test]
    fn test_fewer_than_five_returns_all_matches() {
        let lib = library_with(&[("a", 3), ("b", 3), ("c", 3), ("d", 4)]);
        let rec = lib.recommend(Emotion::Happy);
        assert_eq!(rec.selection, Selection::Filtered);
        let mut ids = track_ids(&rec);
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_more_than_five_samples_five_distinct() {
        let rows: Vec<(String, i64)> = (0..8).map(|i| (format!("s{i}"), 4)).collect();
        let rows: Vec<(&str, i64)> = rows.iter().map(|(n, id)| (n.as_str(), *id)).collect();
        let lib = library_with(&rows);

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let rec = lib.recommend_with(Emotion::Sad, &mut rng);
            assert_eq!(rec.songs.len(), MAX_RECOMMENDATIONS);
            assert!(rec.songs.iter().all(|s| s.emotion_id() == Some(4)));
            let unique: HashSet<String> = track_ids(&rec).into_iter().collect();
            assert_eq!(unique.len(), MAX_RECOMMENDATIONS);
        }
    }

    #[test]
    fn test_filtered_rows_match_emotion_id() {
        let rows: Vec<(String, i64)> = (0..30).map(|i| (format!("s{i}"), i % 7)).collect();
        let rows: Vec<(&str, i64)> = rows.iter().map(|(n, id)| (n.as_str(), *id)).collect();
        let lib = library_with(&rows);

        for emotion in Emotion::ALL {
            let rec = lib.recommend(emotion);
            assert!(rec.songs.len() <= MAX_RECOMMENDATIONS);
            assert!(!rec.songs.is_empty());
            for song in &rec.songs {
                assert_eq!(song.emotion_id(), Some(i64::from(emotion.id())));
                assert_eq!(song.fields[EMOTION_ID_COLUMN], Value::from(emotion.id()));
            }
        }
    }

    #[test]
    fn test_no_matches_returns_empty_filtered() {
        let lib = library_with(&[("a", 1), ("b", 2)]);
        let rec = lib.recommend(Emotion::Surprise);
        assert!(rec.songs.is_empty());
        assert_eq!(rec.selection, Selection::Filtered);
    }

    #[test]
    fn test_missing_category_column_ignores_emotion() {
        let csv = "name,artist\na,x\nb,x\nc,x\nd,x\ne,x\nf,x\ng,x\n";
        let lib = MusicLibrary::from_reader(csv.as_bytes()).unwrap();
        assert!(!lib.has_category_column());

        let rec = lib.recommend(Emotion::Angry);
        assert_eq!(rec.selection, Selection::Unfiltered);
        assert_eq!(rec.songs.len(), MAX_RECOMMENDATIONS);
    }

    #[test]
    fn test_missing_category_column_small_table() {
        let csv = "name\na\nb\n";
        let lib = MusicLibrary::from_reader(csv.as_bytes()).unwrap();
        let rec = lib.recommend(Emotion::Angry);
        assert_eq!(rec.selection, Selection::Unfiltered);
        assert_eq!(rec.songs.len(), 2);
    }

    #[test]
    fn test_unknown_label_maps_to_neutral() {
        let lib = library_with(&[("calm", 6), ("mad", 0)]);
        let rec = lib.recommend_for_label("Confused");
        assert_eq!(track_ids(&rec), vec!["calm"]);
        let rec = lib.recommend_for_label("angry");
        assert_eq!(track_ids(&rec), vec!["mad"]);
    }

    #[test]
    fn test_cell_type_inference() {
        let csv = "name,popularity,valence,emotion_id,album\nTune,42,0.75,3.0,\n";
        let lib = MusicLibrary::from_reader(csv.as_bytes()).unwrap();
        let song = &lib.songs()[0];
        assert_eq!(song.fields["name"], Value::from("Tune"));
        assert_eq!(song.fields["popularity"], Value::from(42));
        assert_eq!(song.fields["valence"], Value::from(0.75));
        assert_eq!(song.fields["album"], Value::Null);
        assert_eq!(song.emotion_id(), Some(3));
    }

    #[test]
    fn test_text_column_keeps_leading_zeros() {
        let csv = "track_id,name\n007,Bond\n5xK9,Other\n";
        let lib = MusicLibrary::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(lib.songs()[0].fields["track_id"], Value::from("007"));
        assert_eq!(lib.songs()[1].fields["track_id"], Value::from("5xK9"));
    }

    #[test]
    fn test_int_column_with_blanks_becomes_float() {
        let csv = "name,popularity\na,42\nb,\nc,7\n";
        let lib = MusicLibrary::from_reader(csv.as_bytes()).unwrap();
        let popularity: Vec<&Value> = lib.songs().iter().map(|s| &s.fields["popularity"]).collect();
        assert_eq!(popularity, vec![&Value::from(42.0), &Value::Null, &Value::from(7.0)]);

        let json = serde_json::to_string(&lib.songs()[0]).unwrap();
        assert_eq!(json, r#"{"name":"a","popularity":42.0}"#);
    }

    #[test]
    fn test_infer_kind() {
        assert_eq!(infer_kind(["1", "2"].into_iter()), ColumnKind::Int);
        assert_eq!(infer_kind(["1", "2.5"].into_iter()), ColumnKind::Float);
        assert_eq!(infer_kind(["1", ""].into_iter()), ColumnKind::Float);
        assert_eq!(infer_kind(["", ""].into_iter()), ColumnKind::Float);
        assert_eq!(infer_kind(["True", "false"].into_iter()), ColumnKind::Bool);
        assert_eq!(infer_kind(["1", "true"].into_iter()), ColumnKind::Text);
        assert_eq!(infer_kind(["007", "x"].into_iter()), ColumnKind::Text);
    }

    #[test]
    fn test_song_serializes_columns_in_order() {
        let lib = library_with(&[("a", 3)]);
        let json = serde_json::to_string(&lib.songs()[0]).unwrap();
        assert_eq!(
            json,
            r#"{"track_id":"a","name":"a song","artist":"Some Artist","emotion_id":3}"#
        );
    }

    #[test]
    fn test_parse_category() {
        assert_eq!(parse_category("4"), Some(4));
        assert_eq!(parse_category("4.0"), Some(4));
        assert_eq!(parse_category("4.5"), None);
        assert_eq!(parse_category(""), None);
        assert_eq!(parse_category("happy"), None);
    }

    #[test]
    fn test_load_or_empty_missing_file() {
        let lib = MusicLibrary::load_or_empty(Path::new("/nonexistent/music.csv"));
        assert!(lib.is_empty());
        assert!(!lib.has_category_column());
    }
}
