//! MeCab-format dictionaries for the Japanese word segmenter.
//!
//! A dictionary is either a single lexicon CSV or a directory holding any
//! number of `*.csv` lexicon files plus an optional `matrix.def`. Lexicon rows
//! are `surface,left_id,right_id,cost,...`; trailing part-of-speech columns are
//! ignored. `matrix.def` starts with a `right_size left_size` header followed by
//! `right_id left_id cost` rows giving the cost of joining a word whose right
//! context id is `right_id` to a following word with left context `left_id`.

use std::path::Path;

use tracing::debug;

use super::error::{Result, TokenizerError};
use super::trie::PrefixTrie;
use super::vocab::read_text;

/// One lexicon entry, without its surface form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Morpheme {
    pub left_id: u16,
    pub right_id: u16,
    pub cost: i16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionMatrix {
    right_size: usize,
    left_size: usize,
    costs: Vec<i16>,
}

impl ConnectionMatrix {
    pub fn parse(data: &str, path: &Path) -> Result<Self> {
        let mut lines = data.lines().filter(|l| !l.trim().is_empty());
        let header = lines
            .next()
            .ok_or_else(|| TokenizerError::resource(path, "connection matrix is empty"))?;
        let (right_size, left_size) = match parse_numbers::<usize>(header, path, 1)?[..] {
            [r, l] => (r, l),
            _ => {
                return Err(TokenizerError::resource(
                    path,
                    "matrix header must be `right_size left_size`",
                ))
            }
        };
        let size = right_size
            .checked_mul(left_size)
            .ok_or_else(|| TokenizerError::resource(path, "matrix is too large"))?;
        let mut costs = vec![0i16; size];
        for (index, line) in lines.enumerate() {
            let line_no = index + 2;
            let [right, left, cost] = parse_numbers::<i64>(line, path, line_no)?[..] else {
                return Err(TokenizerError::resource(
                    path,
                    format!("line {line_no}: expected `right_id left_id cost`"),
                ));
            };
            let (Ok(right), Ok(left), Ok(cost)) =
                (usize::try_from(right), usize::try_from(left), i16::try_from(cost))
            else {
                return Err(TokenizerError::resource(
                    path,
                    format!("line {line_no}: value out of range"),
                ));
            };
            if right >= right_size || left >= left_size {
                return Err(TokenizerError::resource(
                    path,
                    format!("line {line_no}: context id outside {right_size}x{left_size}"),
                ));
            }
            costs[right * left_size + left] = cost;
        }
        Ok(Self {
            right_size,
            left_size,
            costs,
        })
    }

    /// Cost of `prev_right` followed by `next_left`. Ids outside the matrix
    /// cost nothing.
    pub fn cost(&self, prev_right: u16, next_left: u16) -> i32 {
        let (r, l) = (prev_right as usize, next_left as usize);
        if r >= self.right_size || l >= self.left_size {
            return 0;
        }
        self.costs[r * self.left_size + l] as i32
    }
}

fn parse_numbers<T: std::str::FromStr>(line: &str, path: &Path, line_no: usize) -> Result<Vec<T>> {
    line.split_whitespace()
        .map(|field| {
            field.parse().map_err(|_| {
                TokenizerError::resource(path, format!("line {line_no}: bad number {field:?}"))
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    words: PrefixTrie<Vec<Morpheme>>,
    matrix: Option<ConnectionMatrix>,
    entries: usize,
}

impl Dictionary {
    /// Load a lexicon CSV file or a dictionary directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut dictionary = Self::default();
        if path.is_dir() {
            let mut lexicons = Vec::new();
            let listing = std::fs::read_dir(path).map_err(|e| TokenizerError::io(path, e))?;
            for entry in listing {
                let file = entry.map_err(|e| TokenizerError::io(path, e))?.path();
                if file.extension().is_some_and(|ext| ext == "csv") {
                    lexicons.push(file);
                }
            }
            lexicons.sort();
            for file in &lexicons {
                dictionary.add_lexicon(&read_text(file)?, file)?;
            }
            let matrix = path.join("matrix.def");
            if matrix.is_file() {
                dictionary.matrix = Some(ConnectionMatrix::parse(&read_text(&matrix)?, &matrix)?);
            }
        } else {
            dictionary.add_lexicon(&read_text(path)?, path)?;
        }

        if dictionary.entries == 0 {
            return Err(TokenizerError::resource(path, "dictionary has no entries"));
        }
        debug!(
            path = %path.display(),
            entries = dictionary.entries,
            surfaces = dictionary.words.len(),
            matrix = dictionary.matrix.is_some(),
            "loaded dictionary"
        );
        Ok(dictionary)
    }

    /// Add the rows of one lexicon file.
    pub fn add_lexicon(&mut self, data: &str, path: &Path) -> Result<()> {
        for (index, line) in data.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let line_no = index + 1;
            let fields = split_csv(line, 4);
            let [surface, left, right, cost] = &fields[..] else {
                return Err(TokenizerError::resource(
                    path,
                    format!("line {line_no}: expected `surface,left_id,right_id,cost`"),
                ));
            };
            let (Ok(left_id), Ok(right_id), Ok(cost)) = (
                left.trim().parse::<u16>(),
                right.trim().parse::<u16>(),
                cost.trim().parse::<i16>(),
            ) else {
                return Err(TokenizerError::resource(
                    path,
                    format!("line {line_no}: bad context id or cost"),
                ));
            };
            if surface.is_empty() {
                continue;
            }
            self.words
                .entry(surface)
                .get_or_insert_with(Vec::new)
                .push(Morpheme {
                    left_id,
                    right_id,
                    cost,
                });
            self.entries += 1;
        }
        Ok(())
    }

    pub fn set_matrix(&mut self, matrix: ConnectionMatrix) {
        self.matrix = Some(matrix);
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Every entry whose surface is a prefix of `chars`, as (length in chars,
    /// entries).
    pub fn lookup<'a>(
        &'a self,
        chars: &'a [char],
    ) -> impl Iterator<Item = (usize, &'a [Morpheme])> + 'a {
        self.words
            .common_prefixes(chars)
            .map(|(len, entries)| (len, entries.as_slice()))
    }

    pub fn connection_cost(&self, prev_right: u16, next_left: u16) -> i32 {
        self.matrix
            .as_ref()
            .map_or(0, |m| m.cost(prev_right, next_left))
    }
}

/// The first `count` comma separated fields of `line`, honoring double
/// quoted fields with `""` escapes. Remaining columns are not returned.
fn split_csv(line: &str, count: usize) -> Vec<String> {
    let mut fields = Vec::with_capacity(count);
    let mut chars = line.chars().peekable();
    while fields.len() < count {
        let mut field = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(ch) = chars.next() {
                if ch == '"' {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        break;
                    }
                } else {
                    field.push(ch);
                }
            }
            // skip anything between the closing quote and the separator
            for ch in chars.by_ref() {
                if ch == ',' {
                    break;
                }
            }
            fields.push(field);
            continue;
        }
        let mut ended = true;
        for ch in chars.by_ref() {
            if ch == ',' {
                ended = false;
                break;
            }
            field.push(ch);
        }
        fields.push(field);
        if ended {
            break;
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEXICON: &str = "東京,1,1,3000,名詞,固有名詞\n都,2,2,4000,名詞\n東,1,1,6000,名詞\n京都,1,1,3500,名詞\n";

    #[test]
    fn test_lexicon_lookup() {
        let mut dictionary = Dictionary::default();
        dictionary.add_lexicon(LEXICON, Path::new("lex.csv")).unwrap();
        assert_eq!(dictionary.len(), 4);
        let chars: Vec<char> = "東京都".chars().collect();
        let found: Vec<(usize, i16)> = dictionary
            .lookup(&chars)
            .map(|(len, entries)| (len, entries[0].cost))
            .collect();
        assert_eq!(found, vec![(1, 6000), (2, 3000)]);
    }

    #[test]
    fn test_lexicon_rejects_bad_rows() {
        let mut dictionary = Dictionary::default();
        assert!(dictionary.add_lexicon("東京,1,1\n", Path::new("x.csv")).is_err());
        assert!(dictionary.add_lexicon("東京,a,1,10\n", Path::new("x.csv")).is_err());
    }

    #[test]
    fn test_split_csv_quoted() {
        assert_eq!(split_csv("\",\",5,5,100,記号", 4), vec![",", "5", "5", "100"]);
        assert_eq!(split_csv("\"a\"\"b\",1,2,3", 4), vec!["a\"b", "1", "2", "3"]);
        assert_eq!(split_csv("a,b", 4), vec!["a", "b"]);
    }

    #[test]
    fn test_connection_matrix() {
        let matrix = ConnectionMatrix::parse("2 3\n0 0 -5\n1 2 700\n", Path::new("matrix.def")).unwrap();
        assert_eq!(matrix.cost(0, 0), -5);
        assert_eq!(matrix.cost(1, 2), 700);
        assert_eq!(matrix.cost(1, 1), 0);
        assert_eq!(matrix.cost(9, 0), 0);
        assert!(ConnectionMatrix::parse("2 2\n5 0 1\n", Path::new("m")).is_err());
        assert!(ConnectionMatrix::parse("", Path::new("m")).is_err());
    }

    #[test]
    fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.csv"), "東京,1,1,3000,名詞\n").unwrap();
        std::fs::write(dir.path().join("b.csv"), "都,2,2,4000,名詞\n").unwrap();
        std::fs::write(dir.path().join("matrix.def"), "3 3\n1 2 250\n").unwrap();
        std::fs::write(dir.path().join("README"), "ignored").unwrap();
        let dictionary = Dictionary::load(dir.path()).unwrap();
        assert_eq!(dictionary.len(), 2);
        assert_eq!(dictionary.connection_cost(1, 2), 250);

        let empty = tempfile::tempdir().unwrap();
        assert!(Dictionary::load(empty.path()).is_err());
    }
}
