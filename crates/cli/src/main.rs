use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};

use zkredact_core::detection::domain::face_detector::FaceDetector;
use zkredact_core::detection::domain::observation::Descriptor;
use zkredact_core::detection::infrastructure::replay_face_detector::ReplayFaceDetector;
use zkredact_core::matching::domain::face_verifier::FaceVerifier;
use zkredact_core::matching::domain::match_cache::CachePolicy;
use zkredact_core::matching::domain::registry::{IdentityRegistry, RegistryEntry};
use zkredact_core::matching::infrastructure::distance_verifier::DistanceFaceVerifier;
use zkredact_core::matching::infrastructure::http_verifier::HttpFaceVerifier;
use zkredact_core::matching::infrastructure::json_registry::JsonFileRegistry;
use zkredact_core::output::infrastructure::ffmpeg_recorder::FfmpegRecorder;
use zkredact_core::output::infrastructure::jpeg_exporter::JpegSnapshotExporter;
use zkredact_core::session::live_session::{DetectorFactory, LiveSession, SessionDeps};
use zkredact_core::session::session_config::SessionConfig;
use zkredact_core::session::session_logger::StdoutSessionLogger;
use zkredact_core::stream::domain::feed::FeedStatus;
use zkredact_core::stream::infrastructure::threaded_frame_source::ThreadedFrameSource;
use zkredact_core::stream::lifecycle::StreamState;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Live face redaction that blurs only registered identities.
#[derive(Parser)]
#[command(name = "zkredact")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Redact a live source until it ends or --duration elapses.
    Run(RunArgs),
    /// Append a protected identity to a registry file.
    AddFace(AddFaceArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Camera device, stream URL, image feed URL or local file.
    source: String,

    /// Registry of protected identities (faces.json).
    #[arg(long, default_value = "faces.json")]
    registry: PathBuf,

    /// Recorded detections to replay, keyed by frame index.
    #[arg(long)]
    detections: Option<PathBuf>,

    /// Proving service endpoint. Without it a local, non-zero-knowledge
    /// distance check is used.
    #[arg(long)]
    verifier_url: Option<String>,

    /// Session config file (defaults to the user config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Blur strength.
    #[arg(long)]
    blur_intensity: Option<f64>,

    /// Distance bound for the local verifier, in quantized units.
    #[arg(long)]
    match_threshold: Option<f64>,

    /// Keep at most this many proven matches (least recently used evicted).
    #[arg(long, conflicts_with = "cache_ttl")]
    cache_capacity: Option<usize>,

    /// Forget proven matches after this many seconds.
    #[arg(long)]
    cache_ttl: Option<u64>,

    /// Hide the match outlines.
    #[arg(long)]
    no_outlines: bool,

    /// Record the redacted output to this file.
    #[arg(long)]
    record: Option<PathBuf>,

    /// Save a JPEG of the last redacted frame to this file.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Stop after this many seconds.
    #[arg(long)]
    duration: Option<f64>,

    /// Print final stats as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args)]
struct AddFaceArgs {
    /// Registry file to append to (created if missing).
    #[arg(long, default_value = "faces.json")]
    registry: PathBuf,

    #[arg(long)]
    id: String,

    #[arg(long)]
    name: String,

    /// Descriptor as a JSON array, or a path to a file containing one.
    #[arg(long)]
    descriptor: String,

    /// Reference image (path or data URL).
    #[arg(long, default_value = "")]
    image: String,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run(args) => run(args),
        Command::AddFace(args) => add_face(args),
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&args)?;
    let registry = Arc::new(JsonFileRegistry::open(&args.registry)?);
    log::info!(
        "{} protected identities in {}",
        registry.entries().len(),
        args.registry.display()
    );

    let verifier: Arc<dyn FaceVerifier> = match args.verifier_url {
        Some(ref url) => Arc::new(HttpFaceVerifier::new(url, config.verifier_timeout())?),
        None => {
            log::warn!("No --verifier-url; matching locally without zero-knowledge proofs");
            Arc::new(DistanceFaceVerifier::new(config.match_threshold))
        }
    };

    let deps = SessionDeps {
        frame_source: Box::new(ThreadedFrameSource::new()),
        detector: detector_factory(args.detections.clone()),
        verifier,
        registry,
        recorder: Box::new(FfmpegRecorder::new(&config.recording_container)),
        exporter: Box::new(JpegSnapshotExporter::new(config.snapshot_jpeg_quality)),
        logger: Box::new(StdoutSessionLogger::new()),
    };
    let mut session = LiveSession::new(config, deps)?;

    session.start(&args.source)?;
    if let Some(reason) = session.detector_error() {
        eprintln!("Warning: redaction disabled, showing frames unblurred: {reason}");
    }
    if args.record.is_some() {
        session.start_recording()?;
    }

    watch(&mut session, args.duration.map(Duration::from_secs_f64));

    if let Some(ref path) = args.snapshot {
        match session.take_snapshot() {
            Ok(blob) => {
                blob.save(path)?;
                log::info!("Snapshot written to {}", path.display());
            }
            Err(e) => eprintln!("Warning: snapshot failed: {e}"),
        }
    }
    if let Some(ref path) = args.record {
        let recording = if session.state() == &StreamState::Recording {
            session.stop_recording().map(Some)
        } else {
            Ok(session.take_salvaged_recording())
        };
        match recording {
            Ok(Some(blob)) => {
                blob.save(path)?;
                log::info!("Recording written to {} ({} bytes)", path.display(), blob.len());
            }
            Ok(None) => eprintln!("Warning: no recording to save"),
            Err(e) => eprintln!("Warning: recording failed: {e}"),
        }
    }

    let stats = session.stats();
    if session.state() != &StreamState::Idle {
        session.stop()?;
    }
    session.summary();
    if args.json {
        println!("{}", serde_json::to_string(&stats)?);
    }
    Ok(())
}

/// Polls the session until the source ends, fails, or the deadline passes.
fn watch(session: &mut LiveSession, duration: Option<Duration>) {
    let started = Instant::now();
    let mut last_report = started;
    loop {
        thread::sleep(POLL_INTERVAL);
        if session.check_source() {
            if let StreamState::Error(cause) = session.state() {
                eprintln!("Stream failed: {cause}");
            }
            break;
        }
        if session.source_status() == Some(FeedStatus::Ended) {
            log::info!("Source ended");
            break;
        }
        if duration.is_some_and(|d| started.elapsed() >= d) {
            break;
        }
        if last_report.elapsed() >= Duration::from_secs(1) {
            let stats = session.stats();
            log::info!(
                "faces {} | blurred {} | {:.1} fps",
                stats.faces_detected,
                stats.faces_blurred,
                stats.fps
            );
            last_report = Instant::now();
        }
    }
}

fn build_config(args: &RunArgs) -> Result<SessionConfig, Box<dyn std::error::Error>> {
    let mut config = SessionConfig::load(args.config.as_deref())?;
    if let Some(confidence) = args.confidence {
        config.confidence = confidence;
    }
    if let Some(intensity) = args.blur_intensity {
        config.blur_intensity = intensity;
    }
    if let Some(threshold) = args.match_threshold {
        config.match_threshold = threshold;
    }
    if let Some(capacity) = args.cache_capacity {
        config.cache_policy = CachePolicy::Lru { capacity };
    }
    if let Some(seconds) = args.cache_ttl {
        config.cache_policy = CachePolicy::Ttl { seconds };
    }
    if args.no_outlines {
        config.outlines = false;
    }
    config.validate()?;
    Ok(config)
}

fn detector_factory(detections: Option<PathBuf>) -> DetectorFactory {
    Box::new(move || -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
        let path = detections
            .as_deref()
            .ok_or("no detector configured (pass --detections)")?;
        let detector: Box<dyn FaceDetector> = Box::new(ReplayFaceDetector::from_json_file(path)?);
        Ok(detector)
    })
}

fn add_face(args: AddFaceArgs) -> Result<(), Box<dyn std::error::Error>> {
    let descriptor = parse_descriptor(&args.descriptor)?;
    let registry = JsonFileRegistry::open(&args.registry)?;
    let mut entry = RegistryEntry::new(args.id, args.name, descriptor);
    entry.image = args.image;
    let id = entry.id.clone();
    registry.add(entry)?;
    log::info!(
        "Registered {id:?}; {} identities in {}",
        registry.entries().len(),
        args.registry.display()
    );
    Ok(())
}

fn parse_descriptor(arg: &str) -> Result<Descriptor, Box<dyn std::error::Error>> {
    let path = Path::new(arg);
    let json = if path.is_file() {
        std::fs::read_to_string(path)?
    } else {
        arg.to_string()
    };
    let values: Vec<f32> = serde_json::from_str(&json)?;
    Ok(Descriptor::new(values)?)
}
