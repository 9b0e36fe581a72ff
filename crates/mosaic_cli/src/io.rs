//! File formats for the placement tool.
//!
//! All formats are plain line-oriented text, chosen to round-trip through
//! downstream scripts with a simple whitespace split:
//!
//! - board: one line per row of tile-type characters (`p m i u .`)
//! - embeddings: `<block> <f64>...` per line, uniform dimension
//! - packed netlist: `<net>: <block> <block>... [weight=<f64>]` per line;
//!   a block's kind is read from its leading character here and nowhere else
//! - placement: tab-separated `name x y #id` table with a header line

use mosaic_grid::{BlockKind, Board, BoardError, Position, TileType};
use mosaic_place::{Block, BlockId, PackedDesign, PlaceError, Placement};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// Errors raised by the command-line frontend.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// A file could not be read or written.
    #[error("{path}: {source}")]
    Io {
        /// The offending path.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// A line in an input file could not be parsed.
    #[error("{path}:{line}: {message}")]
    Parse {
        /// The offending path.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// The board description is malformed.
    #[error(transparent)]
    Board(#[from] BoardError),

    /// The placement pipeline failed.
    #[error(transparent)]
    Place(#[from] PlaceError),
}

fn read_to_string(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_owned(),
        source,
    })
}

fn parse_error(path: &Path, line: usize, message: impl Into<String>) -> CliError {
    CliError::Parse {
        path: path.to_owned(),
        line,
        message: message.into(),
    }
}

/// Loads a board from a grid of tile-type characters.
pub fn load_board(path: &Path) -> Result<Board, CliError> {
    let text = read_to_string(path)?;
    let mut rows = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row: Result<Vec<TileType>, CliError> = line
            .chars()
            .map(|c| {
                TileType::from_code(c)
                    .ok_or_else(|| parse_error(path, i + 1, format!("unknown tile code '{c}'")))
            })
            .collect();
        rows.push(row?);
    }
    Ok(Board::from_rows(rows)?)
}

/// Loads block embedding vectors; every vector must have the same dimension.
pub fn load_embeddings(path: &Path) -> Result<BTreeMap<BlockId, Vec<f64>>, CliError> {
    let text = read_to_string(path)?;
    let mut embeddings = BTreeMap::new();
    let mut dim = None;
    for (i, line) in text.lines().enumerate() {
        let mut tokens = line.split_whitespace();
        let Some(name) = tokens.next() else {
            continue;
        };
        let vector: Result<Vec<f64>, CliError> = tokens
            .map(|t| {
                t.parse::<f64>()
                    .map_err(|_| parse_error(path, i + 1, format!("bad coordinate '{t}'")))
            })
            .collect();
        let vector = vector?;
        match dim {
            None => dim = Some(vector.len()),
            Some(d) if d != vector.len() => {
                return Err(parse_error(
                    path,
                    i + 1,
                    format!("embedding dimension {} does not match {d}", vector.len()),
                ));
            }
            Some(_) => {}
        }
        embeddings.insert(BlockId::new(name), vector);
    }
    Ok(embeddings)
}

/// The kind a block identifier declares through its leading character.
///
/// This is the only place the identifier's spelling is interpreted; past
/// this point every block carries an explicit [`BlockKind`] tag.
fn kind_of(name: &str) -> Option<BlockKind> {
    match name.chars().next()? {
        'p' => Some(BlockKind::Pe),
        'm' => Some(BlockKind::Mem),
        'i' => Some(BlockKind::Io),
        'u' => Some(BlockKind::Macro),
        _ => None,
    }
}

/// A parsed packed netlist plus the register fold map.
#[derive(Debug)]
pub struct LoadedDesign {
    /// The design with kinds tagged and (optionally) registers folded away.
    pub design: PackedDesign,
    /// Folded register names mapped to the block that absorbed them.
    pub folded: BTreeMap<BlockId, BlockId>,
}

/// Loads a packed netlist.
///
/// Register blocks (leading `r`) are folded onto the first PE block sharing
/// a net with them when `fold_reg` is set; otherwise they become standalone
/// PE blocks. Folded registers are recorded so the output can report them
/// at their host's position.
pub fn load_packed(path: &Path, fold_reg: bool) -> Result<LoadedDesign, CliError> {
    let text = read_to_string(path)?;

    struct RawNet {
        line: usize,
        blocks: Vec<String>,
        weight: f64,
    }
    let mut raw = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, rest)) = line.split_once(':') else {
            return Err(parse_error(path, i + 1, "expected '<net>: <block>...'"));
        };
        if name.trim().is_empty() {
            return Err(parse_error(path, i + 1, "empty net name"));
        }
        let mut blocks = Vec::new();
        let mut weight = 1.0;
        for token in rest.split_whitespace() {
            if let Some(value) = token.strip_prefix("weight=") {
                weight = value
                    .parse()
                    .map_err(|_| parse_error(path, i + 1, format!("bad weight '{value}'")))?;
            } else {
                blocks.push(token.to_owned());
            }
        }
        if blocks.is_empty() {
            return Err(parse_error(path, i + 1, "net connects no blocks"));
        }
        raw.push(RawNet {
            line: i + 1,
            blocks,
            weight,
        });
    }

    // Fold map: each register goes to the first PE it shares a net with.
    let mut folded: BTreeMap<BlockId, BlockId> = BTreeMap::new();
    if fold_reg {
        for net in &raw {
            for name in &net.blocks {
                if !name.starts_with('r') || folded.contains_key(&BlockId::new(name.clone())) {
                    continue;
                }
                if let Some(host) = net.blocks.iter().find(|b| b.starts_with('p')) {
                    folded.insert(BlockId::new(name.clone()), BlockId::new(host.clone()));
                }
            }
        }
    }

    let mut design = PackedDesign::new();
    for net in &raw {
        let mut members = Vec::new();
        for name in &net.blocks {
            let id = BlockId::new(name.clone());
            let id = folded.get(&id).cloned().unwrap_or(id);
            if !design.blocks.contains_key(&id) {
                let kind = if name.starts_with('r') && !folded.contains_key(&BlockId::new(name.clone())) {
                    // Unfolded registers place like PEs.
                    BlockKind::Pe
                } else {
                    kind_of(id.as_str()).ok_or_else(|| {
                        parse_error(path, net.line, format!("unknown block prefix in '{id}'"))
                    })?
                };
                design.add_block(Block {
                    id: id.clone(),
                    kind,
                    embedding: None,
                    fixed: None,
                });
            }
            members.push(id);
        }
        design.add_net(members, net.weight);
    }
    design.prune_nets();
    Ok(LoadedDesign { design, folded })
}

/// Attaches embedding vectors to the design's blocks.
pub fn apply_embeddings(design: &mut PackedDesign, embeddings: &BTreeMap<BlockId, Vec<f64>>) {
    for block in design.blocks.values_mut() {
        if let Some(vector) = embeddings.get(&block.id) {
            block.embedding = Some(vector.clone());
        }
    }
}

/// Writes the placement table, reporting folded registers at their host.
pub fn save_placement(
    path: &Path,
    placement: &Placement,
    folded: &BTreeMap<BlockId, BlockId>,
) -> Result<(), CliError> {
    let mut rows: Vec<(&BlockId, Position)> = placement.iter().collect();
    for (reg, host) in folded {
        if let Some(pos) = placement.get(host) {
            rows.push((reg, pos));
        }
    }
    rows.sort_by_key(|&(name, _)| name.clone());

    let mut out = String::new();
    out.push_str("Block Name\tX\tY\t#Block ID\n");
    for (index, (name, pos)) in rows.iter().enumerate() {
        out.push_str(&format!("{name}\t{}\t{}\t#{index}\n", pos.x, pos.y));
    }

    let mut file = fs::File::create(path).map_err(|source| CliError::Io {
        path: path.to_owned(),
        source,
    })?;
    file.write_all(out.as_bytes()).map_err(|source| CliError::Io {
        path: path.to_owned(),
        source,
    })
}

/// Parses a placement table written by [`save_placement`].
pub fn parse_placement(text: &str) -> Result<Placement, String> {
    let mut placement = Placement::new();
    for line in text.lines().skip(1) {
        let mut tokens = line.split_whitespace();
        let (Some(name), Some(x), Some(y)) = (tokens.next(), tokens.next(), tokens.next()) else {
            continue;
        };
        let x = x.parse().map_err(|_| format!("bad X '{x}'"))?;
        let y = y.parse().map_err(|_| format!("bad Y '{y}'"))?;
        placement.insert(BlockId::new(name), Position::new(x, y));
    }
    Ok(placement)
}

/// Renders the board as ASCII art: occupied cells print their tile code in
/// upper case, free cells in lower case.
pub fn render_board(board: &Board, placement: &Placement) -> String {
    let occupied: std::collections::BTreeSet<Position> =
        placement.iter().map(|(_, p)| p).collect();
    let mut out = String::new();
    for y in 0..board.height() {
        for x in 0..board.width() {
            let pos = Position::new(x, y);
            let code = board.tile_at(pos).map(TileType::code).unwrap_or('?');
            out.push(if occupied.contains(&pos) {
                code.to_ascii_uppercase()
            } else {
                code
            });
        }
        out.push('\n');
    }
    out
}
