use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;

use concordance::analyzer::{AnalyzerConfig, TextAnalyzer};
use concordance::evaluation::{generate_run_file, load_topics, QREL_TOP_K, SEARCH_TOP_K};
use concordance::indexing::build_simple_index;
use concordance::map_reduce::{build_map_reduce_index, MapReduceConfig};
use concordance::postings::{IndexEntry, IndexReader};
use concordance::search::{rank, Bm25Params, RankingMethod};
use concordance::spimi::build_spimi_index;
use concordance::stats::DocumentStats;
use concordance::{collect_document_files, error::IndexError};

#[derive(Parser)]
#[command(
    name = "concordance",
    version,
    about = "Inverted-index construction and ranked retrieval for TREC-style collections"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an inverted index and document stats from a collection
    Index {
        #[arg(value_enum)]
        mode: IndexMode,
        /// Collection file, or directory of collection files
        #[arg(long)]
        input: PathBuf,
        /// Output index file
        #[arg(long, default_value = "concordance.index")]
        index: PathBuf,
        /// Output document-stats file
        #[arg(long, default_value = "concordance.stats")]
        stats: PathBuf,
        /// SPIMI: postings buffered per block
        #[arg(long, default_value_t = 10_000_000)]
        max_tokens_per_block: usize,
        /// Map/Reduce: work-unit size in MiB
        #[arg(long, default_value_t = 16)]
        blocksize: u64,
        /// Map/Reduce: worker count (defaults to the available CPUs)
        #[arg(long)]
        workers: Option<usize>,
        #[command(flatten)]
        analyzer: AnalyzerArgs,
    },
    /// Run one free-text query and print the top results
    Search {
        #[arg(value_enum)]
        method: MethodArg,
        /// Query text
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "concordance.index")]
        index: PathBuf,
        #[arg(long, default_value = "concordance.stats")]
        stats: PathBuf,
        #[command(flatten)]
        okapi: OkapiArgs,
        #[command(flatten)]
        analyzer: AnalyzerArgs,
    },
    /// Rank a topic file and write a TREC run file
    Evaluate {
        #[arg(value_enum)]
        method: MethodArg,
        /// Topic file with <top> blocks
        #[arg(long)]
        topics: PathBuf,
        #[arg(long, default_value = "concordance.index")]
        index: PathBuf,
        #[arg(long, default_value = "concordance.stats")]
        stats: PathBuf,
        /// Output run file
        #[arg(long)]
        output: PathBuf,
        /// Run name written into every line
        #[arg(long, default_value = "dev-run")]
        run_name: String,
        #[command(flatten)]
        okapi: OkapiArgs,
        #[command(flatten)]
        analyzer: AnalyzerArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum IndexMode {
    Simple,
    Spimi,
    MapReduce,
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Tfidf,
    CosineTfidf,
    Bm25,
    Bm25va,
}

impl From<MethodArg> for RankingMethod {
    fn from(method: MethodArg) -> RankingMethod {
        match method {
            MethodArg::Tfidf => RankingMethod::Tfidf,
            MethodArg::CosineTfidf => RankingMethod::CosineTfidf,
            MethodArg::Bm25 => RankingMethod::Bm25,
            MethodArg::Bm25va => RankingMethod::Bm25Va,
        }
    }
}

#[derive(Args)]
struct OkapiArgs {
    /// k1 parameter for bm25/bm25va
    #[arg(long, default_value_t = 1.2)]
    k1: f64,
    /// b parameter for bm25
    #[arg(long, default_value_t = 0.75)]
    b: f64,
    /// k3 parameter for bm25/bm25va
    #[arg(long, default_value_t = 8.0)]
    k3: f64,
}

impl OkapiArgs {
    fn to_params(&self) -> Bm25Params {
        Bm25Params {
            k1: self.k1,
            b: self.b,
            k3: self.k3,
        }
    }
}

#[derive(Args)]
struct AnalyzerArgs {
    /// Disable case folding during preprocessing
    #[arg(long)]
    disable_case_folding: bool,
    /// Disable stop-word removal during preprocessing
    #[arg(long)]
    disable_stop_words: bool,
    /// Disable the stemmer during preprocessing
    #[arg(long)]
    disable_stemmer: bool,
    /// Enable the lemmatiser during preprocessing
    #[arg(long)]
    enable_lemmatizer: bool,
    /// Minimum word length; shorter words are dropped
    #[arg(long, default_value_t = 2)]
    min_word_length: usize,
    /// Keep html tags like "<p>"
    #[arg(long)]
    keep_html_tags: bool,
    /// Keep html entities like "&amp;"
    #[arg(long)]
    keep_html_entities: bool,
    /// Keep square bracket tags like "[BR]"
    #[arg(long)]
    keep_square_bracket_tags: bool,
}

impl AnalyzerArgs {
    fn to_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            case_folding: !self.disable_case_folding,
            remove_stop_words: !self.disable_stop_words,
            stemmer: !self.disable_stemmer,
            lemmatiser: self.enable_lemmatizer,
            min_length: self.min_word_length,
            strip_html_tags: !self.keep_html_tags,
            strip_html_entities: !self.keep_html_entities,
            strip_square_bracket_tags: !self.keep_square_bracket_tags,
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Index {
            mode,
            input,
            index,
            stats,
            max_tokens_per_block,
            blocksize,
            workers,
            analyzer,
        } => {
            let analyzer = TextAnalyzer::new(analyzer.to_config());
            let files = collect_document_files(&input);
            anyhow::ensure!(!files.is_empty(), "no document files under {}", input.display());
            println!("Processing {} file(s)", files.len());

            match mode {
                IndexMode::Simple => {
                    build_simple_index(files, &analyzer, &index, &stats, true)?;
                }
                IndexMode::Spimi => {
                    build_spimi_index(
                        files,
                        &analyzer,
                        &index,
                        &stats,
                        max_tokens_per_block,
                        true,
                    )?;
                }
                IndexMode::MapReduce => {
                    let config = MapReduceConfig {
                        blocksize_mib: blocksize,
                        num_workers: workers,
                    };
                    build_map_reduce_index(files, &analyzer, &index, &stats, &config)?;
                }
            }
            println!("Index written to {}", index.display());
            println!("Document stats written to {}", stats.display());
            Ok(())
        }

        Command::Search {
            method,
            query,
            index,
            stats,
            okapi,
            analyzer,
        } => {
            let analyzer = TextAnalyzer::new(analyzer.to_config());
            let search_terms = analyzer.analyze(&query);
            println!("Searching for {:?}", query);
            println!("Terms: {:?}", search_terms);

            let stats = DocumentStats::load(&stats)
                .with_context(|| format!("loading document stats {}", stats.display()))?;
            let reader = IndexReader::open(&index)
                .with_context(|| format!("opening index {}", index.display()))?;
            let num_documents = reader.num_documents();

            let scores = rank(
                method.into(),
                num_documents,
                reader,
                &search_terms,
                &stats,
                &okapi.to_params(),
            )?;
            for (doc_id, score) in scores.into_iter().take(SEARCH_TOP_K) {
                println!("{:.6}\t{}", score, doc_id);
            }
            Ok(())
        }

        Command::Evaluate {
            method,
            topics,
            index,
            stats,
            output,
            run_name,
            okapi,
            analyzer,
        } => {
            let analyzer = TextAnalyzer::new(analyzer.to_config());
            let topics = load_topics(&topics, &analyzer)
                .with_context(|| "loading topics".to_string())?;
            println!("Searching {} topic(s)", topics.len());

            let stats = DocumentStats::load(&stats)
                .with_context(|| format!("loading document stats {}", stats.display()))?;
            let reader = IndexReader::open(&index)
                .with_context(|| format!("opening index {}", index.display()))?;
            let num_documents = reader.num_documents();
            let entries: Vec<IndexEntry> =
                reader.collect::<Result<Vec<IndexEntry>, IndexError>>()?;

            generate_run_file(
                method.into(),
                num_documents,
                &entries,
                &stats,
                &topics,
                &output,
                &run_name,
                &okapi.to_params(),
                QREL_TOP_K,
            )?;
            println!("Run file written to {}", output.display());
            Ok(())
        }
    }
}
