use file_tail::{Encoding, ReadStreamOptions, TailEvent, TailFile, TailOptions};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== File Tail Comprehensive Example ===\n");

    let dir = tempfile::tempdir()?;

    // Example 1: Surviving log rotation
    println!("1. Rotation - the file is renamed and recreated:");
    rotation(&dir.path().join("rotate.log")).await?;

    println!("\n{}\n", "=".repeat(50));

    // Example 2: Truncation in place
    println!("2. Truncation - the file is emptied and rewritten:");
    truncation(&dir.path().join("truncate.log")).await?;

    println!("\n{}\n", "=".repeat(50));

    // Example 3: Configuration from JSON and text decoding
    println!("3. JSON options with UTF-8 decoding and small chunks:");
    json_options(&dir.path().join("text.log")).await?;

    println!("\n{}\n", "=".repeat(50));

    // Example 4: Missing file retries
    println!("4. Missing file - retrying until the poll budget runs out:");
    missing_file(&dir.path().join("gone.log")).await?;

    Ok(())
}

fn fast_options() -> TailOptions {
    TailOptions {
        poll_file_interval_ms: 50,
        poll_failure_retry_ms: 50,
        ..Default::default()
    }
}

fn append(path: &Path, text: &str) -> std::io::Result<()> {
    OpenOptions::new()
        .append(true)
        .open(path)?
        .write_all(text.as_bytes())
}

/// Prints events until `done` returns true or nothing arrives for a second.
async fn print_events(tail: &mut TailFile, mut done: impl FnMut(&TailEvent) -> bool) {
    loop {
        match tokio::time::timeout(Duration::from_secs(1), tail.next()).await {
            Ok(Some(event)) => {
                match &event {
                    TailEvent::Data(chunk) => {
                        println!("  📦 {:?}", String::from_utf8_lossy(chunk.as_bytes()))
                    }
                    TailEvent::Flush { last_read_position } => {
                        println!("  ✅ flush at byte {}", last_read_position)
                    }
                    TailEvent::Renamed { when, .. } => println!("  🔄 renamed at {}", when),
                    TailEvent::Truncated { when, .. } => println!("  ✂️  truncated at {}", when),
                    TailEvent::Retry { attempts, .. } => {
                        println!("  ⏳ missing, attempt {}", attempts)
                    }
                    TailEvent::ReadError(e) => println!("  ⚠️  read error: {}", e),
                    TailEvent::Error(e) => println!("  ❌ error: {}", e),
                }
                if done(&event) {
                    break;
                }
            }
            Ok(None) => {
                println!("  ℹ️  Stream ended");
                break;
            }
            Err(_) => {
                println!("  ⏰ Timeout - no new events");
                break;
            }
        }
    }
}

async fn rotation(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    fs::write(path, "before rotation\n")?;
    let mut tail = TailFile::new(path, fast_options())?;
    tail.start().await?;

    append(path, "last line of the old file\n")?;
    let mut rotated = path.as_os_str().to_owned();
    rotated.push(".1");
    fs::rename(path, &rotated)?;
    fs::write(path, "first line of the new file\n")?;

    let mut seen_rename = false;
    print_events(&mut tail, |event| {
        seen_rename |= matches!(event, TailEvent::Renamed { .. });
        seen_rename && matches!(event, TailEvent::Flush { .. })
    })
    .await;

    tail.quit().await;
    Ok(())
}

async fn truncation(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    fs::write(path, "a long line that will be discarded\n")?;
    let mut tail = TailFile::new(path, fast_options())?;
    tail.start().await?;

    OpenOptions::new().write(true).open(path)?.set_len(0)?;
    append(path, "fresh\n")?;

    let mut seen_truncate = false;
    print_events(&mut tail, |event| {
        seen_truncate |= matches!(event, TailEvent::Truncated { .. });
        seen_truncate && matches!(event, TailEvent::Flush { .. })
    })
    .await;

    println!("  Resume point: byte {}", tail.quit().await);
    Ok(())
}

async fn json_options(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    fs::write(path, "ünïcödé text\n")?;

    let mut options = TailOptions::from_json(
        r#"{
            "encoding": "utf8",
            "startPos": 0,
            "pollFileIntervalMs": 50,
            "readStreamOpts": { "chunkSize": 4 }
        }"#,
    )?;
    assert_eq!(options.encoding, Some(Encoding::Utf8));
    options.read_stream_opts = ReadStreamOptions {
        high_water_mark: 4,
        ..options.read_stream_opts
    };

    let mut tail = TailFile::new(path, options)?;
    tail.start().await?;

    // Multi-byte characters split across 4-byte chunks still decode whole.
    print_events(&mut tail, |event| matches!(event, TailEvent::Flush { .. })).await;

    tail.quit().await;
    Ok(())
}

async fn missing_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    fs::write(path, "")?;
    let options = TailOptions {
        max_poll_failures: 3,
        ..fast_options()
    };
    let mut tail = TailFile::new(path, options)?;
    tail.start().await?;

    fs::remove_file(path)?;
    print_events(&mut tail, |_| false).await;

    println!("  Still running: {}", tail.is_running());
    Ok(())
}
