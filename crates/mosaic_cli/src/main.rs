//! mosaic-place — the command-line frontend for the Mosaic CGRA placer.
//!
//! Reads a packed netlist, its block embeddings, and a board layout, runs
//! the placement pipeline, writes the placement table, and optionally
//! renders the occupied board to stdout.

#![warn(missing_docs)]

mod io;

use clap::Parser;
use env_logger::Env;
use io::CliError;
use mosaic_place::PlacerOptions;
use std::path::PathBuf;
use std::process;

/// Mosaic — a CGRA placement tool.
#[derive(Parser, Debug)]
#[command(name = "mosaic-place", version, about = "Mosaic CGRA placer")]
pub struct Cli {
    /// Packed netlist file.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Block embedding file.
    #[arg(short, long)]
    pub embedding: PathBuf,

    /// Output placement file.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Board layout file (one line of tile codes per row).
    #[arg(short, long)]
    pub cgra: PathBuf,

    /// Keep registers as standalone blocks instead of folding them onto
    /// a connected PE.
    #[arg(long)]
    pub no_reg_fold: bool,

    /// Skip the ASCII board rendering.
    #[arg(long)]
    pub no_vis: bool,

    /// Base seed for all randomized stages.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Cluster count override (default: derived from the netlist size).
    #[arg(long)]
    pub clusters: Option<usize>,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let board = io::load_board(&cli.cgra)?;
    let loaded = io::load_packed(&cli.input, !cli.no_reg_fold)?;
    let embeddings = io::load_embeddings(&cli.embedding)?;

    let mut design = loaded.design;
    io::apply_embeddings(&mut design, &embeddings);

    log::info!(
        "placing {} blocks ({} nets) on a {}x{} board",
        design.blocks.len(),
        design.nets.len(),
        board.width(),
        board.height()
    );

    let options = PlacerOptions {
        num_clusters: cli.clusters,
        seed: cli.seed,
        ..Default::default()
    };
    let placement = mosaic_place::run_pipeline(&design, &board, &options)?;

    io::save_placement(&cli.output, &placement, &loaded.folded)?;
    log::info!("wrote {}", cli.output.display());

    if !cli.no_vis {
        print!("{}", io::render_board(&board, &placement));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parse_minimal_flags() {
        let cli = Cli::parse_from([
            "mosaic-place",
            "--input",
            "design.packed",
            "--embedding",
            "design.emb",
            "--output",
            "design.place",
            "--cgra",
            "board.txt",
        ]);
        assert_eq!(cli.input, PathBuf::from("design.packed"));
        assert_eq!(cli.seed, 0);
        assert!(!cli.no_reg_fold);
        assert!(!cli.no_vis);
        assert!(cli.clusters.is_none());
    }

    #[test]
    fn parse_all_flags() {
        let cli = Cli::parse_from([
            "mosaic-place",
            "-i",
            "a",
            "-e",
            "b",
            "-o",
            "c",
            "-c",
            "d",
            "--no-reg-fold",
            "--no-vis",
            "--seed",
            "42",
            "--clusters",
            "3",
        ]);
        assert!(cli.no_reg_fold);
        assert!(cli.no_vis);
        assert_eq!(cli.seed, 42);
        assert_eq!(cli.clusters, Some(3));
    }

    #[test]
    fn missing_required_flag_fails() {
        assert!(Cli::try_parse_from(["mosaic-place", "--input", "a"]).is_err());
    }

    #[test]
    fn end_to_end_writes_a_complete_placement() {
        let mut cgra = NamedTempFile::new().unwrap();
        write!(cgra, "ippp\nippp\n.mmm\n").unwrap();
        let mut packed = NamedTempFile::new().unwrap();
        write!(
            packed,
            "n1: i1 p1\nn2: p1 p2 weight=2\nn3: p2 m1\nn4: r1 p2\n"
        )
        .unwrap();
        let mut emb = NamedTempFile::new().unwrap();
        write!(emb, "p1 0.0 0.0\np2 1.0 0.0\nm1 1.0 1.0\n").unwrap();
        let out = NamedTempFile::new().unwrap();

        let cli = Cli::parse_from([
            "mosaic-place",
            "--input",
            packed.path().to_str().unwrap(),
            "--embedding",
            emb.path().to_str().unwrap(),
            "--output",
            out.path().to_str().unwrap(),
            "--cgra",
            cgra.path().to_str().unwrap(),
            "--no-vis",
        ]);
        run(&cli).unwrap();

        let text = std::fs::read_to_string(out.path()).unwrap();
        let placement = io::parse_placement(&text).unwrap();
        // i1, p1, p2, m1, plus the folded register r1 at p2's cell.
        assert_eq!(placement.len(), 5);
        assert_eq!(
            placement.get(&mosaic_place::BlockId::new("r1")),
            placement.get(&mosaic_place::BlockId::new("p2"))
        );
    }
}
