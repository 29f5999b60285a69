//! Recursive character text splitter
//!
//! Splits on the coarsest separator present in the text, merges the pieces
//! back into chunks of at most `chunk_size` characters with `chunk_overlap`
//! characters carried between neighbours, and recurses with finer separators
//! for any piece that is still too large. Lengths are counted in characters.

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(500, 50)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl TextSplitter {
    /// Chunk size is at least 1; overlap is kept strictly below it.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: DEFAULT_SEPARATORS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = "";
        let mut finer: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate.as_str();
                finer = separators.get(i + 1..).unwrap_or_default();
                break;
            }
        }

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_with(&piece, finer));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }
        chunks
    }

    /// Greedily pack pieces shorter than the chunk size, keeping a tail of
    /// up to `chunk_overlap` characters as the start of the next chunk.
    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joined_len = |window_len: usize, total: usize| {
                total + len + if window_len > 0 { sep_len } else { 0 }
            };

            if joined_len(window.len(), total) > self.chunk_size && !window.is_empty() {
                push_chunk(&mut chunks, &window, separator);

                while total > self.chunk_overlap
                    || (total > 0 && joined_len(window.len(), total) > self.chunk_size)
                {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if window.is_empty() { 0 } else { sep_len };
                }
            }

            if !window.is_empty() {
                total += sep_len;
            }
            total += len;
            window.push_back(piece);
        }

        push_chunk(&mut chunks, &window, separator);
        chunks
    }
}

fn push_chunk(chunks: &mut Vec<String>, window: &std::collections::VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}
