use clap::{App, Arg, SubCommand};
use std::collections::HashSet;
use std::io::{BufReader, BufWriter, Write};
use vntrcount::assembler::get_matcher;
use vntrcount::cache::{DirectoryCache, MemoryCache, ModelCache};
use vntrcount::candidates::{CandidateSource, IdListDirectory};
use vntrcount::estimate::estimate_copy_number;
use vntrcount::fasta::FastaReads;
use vntrcount::msa::{AutoAligner, ExternalAligner};
use vntrcount::{CopyNumber, EstimateConfig, Result, VntrError, VntrLocus};
#[macro_use]
extern crate log;

fn subcommand_profile() -> App<'static, 'static> {
    SubCommand::with_name("profile")
        .version("0.1")
        .about("Train a profile HMM from aligned repeat segments and print its tables.")
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Debug mode"),
        )
        .arg(
            Arg::with_name("alignment")
                .long("alignment")
                .short("a")
                .value_name("FASTA")
                .takes_value(true)
                .required(true)
                .help("Aligned repeat segments. FASTA format."),
        )
        .arg(
            Arg::with_name("insertion_threshold")
                .long("insertion_threshold")
                .takes_value(true)
                .default_value("0.1")
                .help("Fraction of gaps making a column an insertion column."),
        )
        .arg(
            Arg::with_name("segment_replicates")
                .long("segment_replicates")
                .takes_value(true)
                .default_value("1")
                .help("Times each segment is counted when training. Weighs the pseudocount up."),
        )
        .arg(
            Arg::with_name("error_rate")
                .long("error_rate")
                .takes_value(true)
                .default_value("0.05")
                .help("Sequencing error rate. Decides the pseudocount."),
        )
        .arg(
            Arg::with_name("threads")
                .long("threads")
                .short("t")
                .takes_value(true)
                .default_value("1")
                .help("Number of threads"),
        )
}

fn subcommand_estimate() -> App<'static, 'static> {
    SubCommand::with_name("estimate")
        .version("0.1")
        .about("Estimate the copy number of each VNTR from short reads.")
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("Debug mode"),
        )
        .arg(
            Arg::with_name("loci")
                .long("loci")
                .short("l")
                .value_name("JSON")
                .takes_value(true)
                .required(true)
                .help("Reference VNTRs. JSON array."),
        )
        .arg(
            Arg::with_name("reads")
                .long("reads")
                .short("r")
                .value_name("FASTA")
                .takes_value(true)
                .multiple(true)
                .required(true)
                .help("Short reads. FASTA format. Files are read in order."),
        )
        .arg(
            Arg::with_name("candidates")
                .long("candidates")
                .short("c")
                .value_name("DIR")
                .takes_value(true)
                .required(true)
                .help("Directory with a <locus id>.ids list of candidate reads per locus."),
        )
        .arg(
            Arg::with_name("truth")
                .long("truth")
                .value_name("SAM")
                .takes_value(true)
                .help("Alignments of the reads. Reads over a locus are its true reads."),
        )
        .arg(
            Arg::with_name("chromosome")
                .long("chromosome")
                .takes_value(true)
                .help("Only estimate the loci on this chromosome."),
        )
        .arg(
            Arg::with_name("cache")
                .long("cache")
                .value_name("DIR")
                .takes_value(true)
                .help("Directory to store the matcher models."),
        )
        .arg(
            Arg::with_name("use_cache")
                .long("use_cache")
                .help("Load matcher models from the cache instead of training."),
        )
        .arg(
            Arg::with_name("aligner")
                .long("aligner")
                .takes_value(true)
                .default_value("muscle -quiet")
                .help("Command aligning the repeat segments (FASTA on stdin/stdout)."),
        )
        .arg(
            Arg::with_name("read_length")
                .long("read_length")
                .takes_value(true)
                .default_value("150")
                .help("Read length used to decide the number of repeat copies."),
        )
        .arg(
            Arg::with_name("genome_length")
                .long("genome_length")
                .takes_value(true)
                .default_value("102531392")
                .help("Length of the sequenced genome, for the coverage."),
        )
        .arg(
            Arg::with_name("insertion_threshold")
                .long("insertion_threshold")
                .takes_value(true)
                .default_value("0.1")
                .help("Fraction of gaps making a column an insertion column."),
        )
        .arg(
            Arg::with_name("segment_replicates")
                .long("segment_replicates")
                .takes_value(true)
                .default_value("1")
                .help("Times each segment is counted when training. Weighs the pseudocount up."),
        )
        .arg(
            Arg::with_name("error_rate")
                .long("error_rate")
                .takes_value(true)
                .default_value("0.05")
                .help("Sequencing error rate. Decides the pseudocount."),
        )
        .arg(
            Arg::with_name("min_repeat_bp")
                .long("min_repeat_bp")
                .takes_value(true)
                .default_value("2")
                .help("Reads with fewer bases in the repeat are not counted."),
        )
        .arg(
            Arg::with_name("output")
                .long("output")
                .short("o")
                .takes_value(true)
                .help("Output file. Standard output if not given."),
        )
        .arg(
            Arg::with_name("diagnostics")
                .long("diagnostics")
                .takes_value(true)
                .help("File to append the per-threshold evaluations to."),
        )
        .arg(
            Arg::with_name("threads")
                .long("threads")
                .short("t")
                .takes_value(true)
                .default_value("1")
                .help("Number of threads"),
        )
}

fn parse<T: std::str::FromStr>(matches: &clap::ArgMatches, name: &str) -> Result<T> {
    let value = matches.value_of(name).unwrap_or("");
    value.parse().map_err(|_| {
        let why = format!("invalid value for --{}: {:?}", name, value);
        VntrError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, why))
    })
}

fn profile(matches: &clap::ArgMatches) -> Result<()> {
    let insertion_threshold: f64 = parse(matches, "insertion_threshold")?;
    let error_rate: f64 = parse(matches, "error_rate")?;
    let path = matches.value_of("alignment").unwrap_or("");
    let rows: Vec<_> = vntrcount::fasta::read_fasta(path)?
        .into_iter()
        .map(|(_, seq)| seq)
        .collect();
    let replicates: usize = parse(matches, "segment_replicates")?;
    let alignment = vntrcount::profile::Alignment::new(&rows)?.replicated(replicates);
    let pseudocount = vntrcount::profile::pseudocount(alignment.rows().len(), error_rate);
    let profile = vntrcount::profile::train(&alignment, insertion_threshold, pseudocount)?;
    let stdout = std::io::stdout();
    let mut wtr = BufWriter::new(stdout.lock());
    write!(wtr, "{}", profile)?;
    writeln!(wtr, "consensus\t{}", String::from_utf8_lossy(&profile.consensus()))?;
    Ok(())
}

fn truth_reads(sam: &str, locus: &VntrLocus) -> Result<HashSet<String>> {
    let rdr = std::fs::File::open(sam).map(BufReader::new)?;
    let (start, end) = (locus.start(), locus.end());
    let (reads, _) = vntrcount::sam::related_reads(rdr, locus.chromosome(), start, end)?;
    Ok(reads)
}

fn estimate(matches: &clap::ArgMatches) -> Result<()> {
    let config = EstimateConfig::new(
        parse(matches, "read_length")?,
        parse(matches, "genome_length")?,
    )
    .with_insertion_threshold(parse(matches, "insertion_threshold")?)
    .with_error_rate(parse(matches, "error_rate")?)
    .with_segment_replicates(parse(matches, "segment_replicates")?)
    .with_min_repeat_bp(parse(matches, "min_repeat_bp")?)
    .with_cached_models(matches.is_present("use_cache"));
    let loci = std::fs::File::open(matches.value_of("loci").unwrap_or(""))
        .map(BufReader::new)
        .map_err(VntrError::from)
        .and_then(vntrcount::locus::load_loci)?;
    let reads: Vec<_> = matches
        .values_of("reads")
        .map(|files| files.collect())
        .unwrap_or_default();
    let candidates = IdListDirectory::new(matches.value_of("candidates").unwrap_or("."));
    let cache: Box<dyn ModelCache> = match matches.value_of("cache") {
        Some(dir) => Box::new(DirectoryCache::new(dir)?),
        None => Box::new(MemoryCache::new()),
    };
    let aligner = AutoAligner::new(
        matches
            .value_of("aligner")
            .and_then(ExternalAligner::from_command_line),
    );
    let mut output: Box<dyn Write> = match matches.value_of("output") {
        Some(path) => Box::new(BufWriter::new(std::fs::File::create(path)?)),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };
    let mut diagnostics = match matches.value_of("diagnostics") {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(BufWriter::new(file))
        }
        None => None,
    };
    let chromosome = matches.value_of("chromosome");
    let loci: Vec<_> = loci
        .iter()
        .filter(|locus| chromosome.map(|c| c == locus.chromosome()).unwrap_or(true))
        .collect();
    info!("Estimating {} loci", loci.len());
    for locus in loci {
        info!("Start {} ({})", locus.id(), String::from_utf8_lossy(locus.pattern()));
        let run = || -> Result<vntrcount::Estimate> {
            let copies = locus.copy_count(config.read_length);
            let model = get_matcher(locus, copies, &config, &aligner, cache.as_ref())?;
            let ids = candidates.candidates(locus)?;
            let truth = match matches.value_of("truth") {
                Some(sam) => Some(truth_reads(sam, locus)?),
                None => None,
            };
            let reads = FastaReads::open(&reads);
            estimate_copy_number(locus, &model, &ids, truth.as_ref(), reads, &config)
        };
        match run() {
            Ok(estimate) => {
                match &estimate.copy_number {
                    CopyNumber::Resolved(cn) => info!("Finish {}: {:.3}", locus.id(), cn),
                    CopyNumber::Unresolved(why) => warn!("Finish {}: {}", locus.id(), why),
                }
                vntrcount::report::write_estimate(&mut output, locus, &estimate.copy_number)?;
                if let Some(wtr) = diagnostics.as_mut() {
                    vntrcount::report::append_diagnostics(wtr, locus, &estimate)?;
                }
            }
            Err(why) => warn!("Failed to estimate {}: {}", locus.id(), why),
        }
    }
    output.flush()?;
    if let Some(mut wtr) = diagnostics {
        wtr.flush()?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let matches = App::new("vntrcount")
        .version("0.1")
        .about("Profile:[FASTA]->Tables or Estimate:[JSON]x[FASTA]x[IDS]->[TSV]")
        .setting(clap::AppSettings::ArgRequiredElseHelp)
        .subcommand(subcommand_profile())
        .subcommand(subcommand_estimate())
        .get_matches();
    if let Some(sub_m) = matches.subcommand().1 {
        let level = match sub_m.occurrences_of("verbose") {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
        let threads: usize = parse(sub_m, "threads")?;
        if let Err(why) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            debug!("{:?}", why);
        }
    }
    debug!("Start");
    match matches.subcommand() {
        ("profile", Some(sub_m)) => profile(sub_m),
        ("estimate", Some(sub_m)) => estimate(sub_m),
        _ => Ok(()),
    }
}
