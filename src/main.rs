use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rusqlite::Connection;
use tracing::{info, warn};

use lineup_scanner::matcher::spotify::SpotifyClient;
use lineup_scanner::ocr::sniff_format;
use lineup_scanner::{
    db, ArtistDetails, ArtistMatcher, Candidate, MatchResult, SchedulePolicy, Segmenter, Settings, TextDetector,
    VisionClient,
};

#[derive(Parser)]
#[command(name = "lineup", about = "Festival poster OCR text to artist profiles")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract candidate artist names from OCR text files ("-" reads stdin)
    Segment {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Print candidates as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run text detection on a poster image and print the transcript
    Ocr { image: PathBuf },
    /// Resolve artist names to Spotify profiles
    Resolve {
        #[arg(required = true)]
        names: Vec<String>,
        /// Resolve one name at a time
        #[arg(long)]
        serial: bool,
        #[arg(long)]
        json: bool,
    },
    /// Segment + resolve every candidate from an OCR text file or poster image
    Run {
        file: PathBuf,
        /// Save the resolved lineup under this name
        #[arg(long)]
        save: Option<String>,
    },
    /// Record whether a piece of OCR text is an artist
    Feedback {
        text: String,
        #[arg(long, conflicts_with = "not_artist", required_unless_present = "not_artist")]
        artist: bool,
        #[arg(long)]
        not_artist: bool,
    },
    /// Show a saved lineup (or list all lineups)
    Show { lineup: Option<String> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    info!(?settings, "loaded settings");

    let result = match cli.command {
        Commands::Segment { files, json } => {
            let conn = open_db(&settings)?;
            let segmenter = build_segmenter(&settings, &conn)?;
            let texts = files
                .iter()
                .map(|f| read_text(f).map(|t| (f, t)))
                .collect::<Result<Vec<_>>>()?;

            let per_file: Vec<(&PathBuf, Vec<Candidate>)> = texts
                .par_iter()
                .map(|(f, text)| (*f, segmenter.segment(text)))
                .collect();

            if json {
                let out: HashMap<String, &Vec<Candidate>> = per_file
                    .iter()
                    .map(|(f, c)| (f.display().to_string(), c))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for (f, candidates) in &per_file {
                    if per_file.len() > 1 {
                        println!("== {} ==", f.display());
                    }
                    print_candidates(candidates);
                }
            }
            Ok(())
        }
        Commands::Ocr { image } => {
            let bytes = read_bytes(&image)?;
            let transcript = detect_text(&settings, &bytes)
                .await
                .with_context(|| format!("Text detection failed for {}", image.display()))?;
            if transcript.is_empty() {
                println!("No text detected.");
            } else {
                println!("{}", transcript);
            }
            Ok(())
        }
        Commands::Resolve { names, serial, json } => {
            let matcher = build_matcher(&settings)?;
            let policy = if serial {
                SchedulePolicy::Serial
            } else {
                SchedulePolicy::Concurrent(settings.concurrency)
            };
            let results = resolve_batch(&matcher, &names, policy).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_results(&results);
            }
            Ok(())
        }
        Commands::Run { file, save } => {
            let conn = open_db(&settings)?;
            let segmenter = build_segmenter(&settings, &conn)?;

            let t_extract = Instant::now();
            let bytes = read_bytes(&file)?;
            let text = if sniff_format(&bytes).is_some() {
                detect_text(&settings, &bytes)
                    .await
                    .with_context(|| format!("Text detection failed for {}", file.display()))?
            } else {
                String::from_utf8(bytes).context("Input is neither an image nor UTF-8 text")?
            };
            let candidates = segmenter.segment(&text);
            println!(
                "Extracted {} candidates in {:.1}s",
                candidates.len(),
                t_extract.elapsed().as_secs_f64()
            );
            if candidates.is_empty() {
                println!("No artist names found.");
                return Ok(());
            }

            let matcher = build_matcher(&settings)?;
            let names: Vec<String> = candidates.into_iter().map(|c| c.text).collect();
            let results =
                resolve_batch(&matcher, &names, SchedulePolicy::Concurrent(settings.concurrency))
                    .await?;
            print_results(&results);

            if let Some(lineup) = save {
                let saved = db::save_lineup(&conn, &lineup, &results)?;
                println!("\nSaved {} artists to lineup '{}'", saved, lineup);
            }
            Ok(())
        }
        Commands::Feedback { text, artist, not_artist } => {
            let conn = open_db(&settings)?;
            let is_artist = artist && !not_artist;
            db::record_feedback(&conn, &text, is_artist)?;
            println!(
                "Recorded '{}' as {}",
                text.trim(),
                if is_artist { "an artist" } else { "not an artist" }
            );
            Ok(())
        }
        Commands::Show { lineup } => {
            let conn = open_db(&settings)?;
            match lineup {
                Some(name) => match db::fetch_lineup(&conn, &name)? {
                    Some(results) if !results.is_empty() => print_results(&results),
                    Some(_) => println!("Lineup '{}' is empty.", name),
                    None => println!("No lineup named '{}'.", name),
                },
                None => {
                    let lineups = db::list_lineups(&conn)?;
                    if lineups.is_empty() {
                        println!("No saved lineups. Use 'run <FILE> --save <NAME>' first.");
                        return Ok(());
                    }
                    println!("{:<32} | {:<19} | {:>7}", "Lineup", "Saved", "Artists");
                    println!("{}", "-".repeat(64));
                    for l in &lineups {
                        println!(
                            "{:<32} | {:<19} | {:>7}",
                            fit(&l.name, 32),
                            l.saved_at.format("%Y-%m-%d %H:%M:%S"),
                            l.artists
                        );
                    }
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", elapsed_label(elapsed));
    }

    result
}

fn open_db(settings: &Settings) -> Result<Connection> {
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

/// Deny-list extended with rejected feedback; confirmed artists marked as known.
fn build_segmenter(settings: &Settings, conn: &Connection) -> Result<Segmenter> {
    let mut config = settings.segmenter_config();
    let excluded = db::excluded_words(conn)?;
    let known = db::known_artists(conn)?;
    info!(excluded = excluded.len(), known = known.len(), "loaded reviewer feedback");
    config.deny_list.extend(excluded);
    Ok(Segmenter::new(&config)?.with_known_artists(known))
}

fn build_matcher(settings: &Settings) -> Result<Arc<ArtistMatcher>> {
    let credentials = settings.spotify_credentials();
    if credentials.is_none() {
        warn!("Spotify credentials are not set; set LINEUP_SPOTIFY_CLIENT_ID and LINEUP_SPOTIFY_CLIENT_SECRET");
    }
    let client = Arc::new(SpotifyClient::new(
        credentials,
        &settings.spotify_accounts_url,
        &settings.spotify_api_url,
        settings.request_timeout(),
    )?);
    Ok(Arc::new(ArtistMatcher::new(
        client.clone(),
        client,
        settings.matcher_config(),
    )))
}

async fn detect_text(settings: &Settings, image: &[u8]) -> Result<String> {
    let vision = VisionClient::new(
        settings.vision_api_key.clone(),
        &settings.vision_url,
        settings.request_timeout(),
    )?;
    Ok(vision.detect_text(image).await?)
}

/// Results in input order, one row per distinct input name.
async fn resolve_batch(
    matcher: &Arc<ArtistMatcher>,
    names: &[String],
    policy: SchedulePolicy,
) -> Result<Vec<MatchResult>> {
    let pb = ProgressBar::new(names.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut by_name = matcher.resolve_all(names, policy, &pb).await?;
    let mut ordered = Vec::with_capacity(by_name.len());
    for name in names {
        if let Some(r) = by_name.remove(name) {
            ordered.push(r);
        }
    }
    Ok(ordered)
}

fn read_text(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_candidates(candidates: &[Candidate]) {
    if candidates.is_empty() {
        println!("No candidates.");
        return;
    }
    for (i, c) in candidates.iter().enumerate() {
        println!("{:>3} | {:<7} | {}", i + 1, c.confidence, c.text);
    }
}

fn print_results(results: &[MatchResult]) {
    println!(
        "{:>3} | {:<28} | {:<28} | {:<5} | {:>4} | {}",
        "#", "Searched", "Matched", "Type", "Conf", "URL"
    );
    println!("{}", "-".repeat(110));

    for (i, r) in results.iter().enumerate() {
        let matched = r.matched_name.as_deref().unwrap_or("-");
        println!(
            "{:>3} | {:<28} | {:<28} | {:<5} | {:>4.2} | {}",
            i + 1,
            fit(&r.searched_name, 28),
            fit(matched, 28),
            r.match_type.as_str(),
            r.confidence,
            r.profile_url
        );
        if let Some(details) = &r.details {
            print_details(details);
        }
    }

    let found = results.iter().filter(|r| r.matched_name.is_some()).count();
    println!("\n{} names | {} matched | {} unmatched", results.len(), found, results.len() - found);
}

fn print_details(details: &ArtistDetails) {
    let mut facts = Vec::new();
    if !details.genres.is_empty() {
        facts.push(details.genres.join(", "));
    }
    if let Some(p) = details.popularity {
        facts.push(format!("popularity {p}"));
    }
    if let Some(f) = details.followers {
        facts.push(format!("{} followers", compact_count(f)));
    }
    if !facts.is_empty() {
        println!("    | {}", facts.join(" · "));
    }
    for track in &details.top_tracks {
        println!(
            "    |   ♪ {:<40} {}",
            fit(&track.name, 40),
            track.spotify_url.as_deref().unwrap_or("")
        );
    }
}

/// Cut `s` to at most `width` chars, ending in an ellipsis when shortened.
fn fit(s: &str, width: usize) -> Cow<'_, str> {
    if s.chars().nth(width).is_none() {
        return Cow::Borrowed(s);
    }
    let end = s
        .char_indices()
        .nth(width.saturating_sub(1))
        .map_or(s.len(), |(i, _)| i);
    Cow::Owned(format!("{}…", &s[..end]))
}

fn elapsed_label(d: Duration) -> String {
    let total = d.as_secs();
    let (h, m, s) = (total / 3600, total / 60 % 60, total % 60);
    match (h, m) {
        (0, 0) => format!("{:.1}s", d.as_secs_f64()),
        (0, _) => format!("{m}m {s:02}s"),
        _ => format!("{h}h {m:02}m {s:02}s"),
    }
}

/// 980, 12.3K, 1.5M
fn compact_count(n: u64) -> String {
    match n {
        0..=999 => n.to_string(),
        1_000..=999_999 => format!("{:.1}K", n as f64 / 1e3),
        _ => format!("{:.1}M", n as f64 / 1e6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_keeps_short_text_and_width() {
        assert_eq!(fit("Bonobo", 28), "Bonobo");
        assert_eq!(fit("Bonobo", 6), "Bonobo");
        assert_eq!(fit("Claude VonStroke", 8), "Claude …");
        assert_eq!(fit("Claude VonStroke", 8).chars().count(), 8);
        // multi-byte names cut on char boundaries
        assert_eq!(fit("Sigur Rós Orchestra", 9), "Sigur Ró…");
        assert_eq!(fit("Rüfüs Du Sol", 1), "…");
    }

    #[test]
    fn elapsed_label_units() {
        assert_eq!(elapsed_label(Duration::from_millis(2_500)), "2.5s");
        assert_eq!(elapsed_label(Duration::from_secs(65)), "1m 05s");
        assert_eq!(elapsed_label(Duration::from_secs(3_723)), "1h 02m 03s");
    }

    #[test]
    fn compact_follower_counts() {
        assert_eq!(compact_count(980), "980");
        assert_eq!(compact_count(12_345), "12.3K");
        assert_eq!(compact_count(1_500_000), "1.5M");
    }
}
