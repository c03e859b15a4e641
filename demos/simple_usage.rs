use file_tail::{TailEvent, TailOptions, tail_file};
use std::io::Write;
use std::time::Duration;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("app.log");
    std::fs::write(&path, "already here\n")?;

    // Follow from the end of the file, polling quickly for the demo
    let options = TailOptions {
        poll_file_interval_ms: 100,
        ..Default::default()
    };
    let mut tail = tail_file(&path, options).await?;

    let writer_path = path.clone();
    tokio::spawn(async move {
        for i in 1..=3 {
            tokio::time::sleep(Duration::from_millis(150)).await;
            if let Ok(mut file) = std::fs::OpenOptions::new().append(true).open(&writer_path) {
                let _ = writeln!(file, "LINE {}", i);
            }
        }
    });

    println!("Following {} - appending three lines...", path.display());

    let mut lines = 0;
    while let Some(event) = tail.next().await {
        match event {
            TailEvent::Data(chunk) => {
                let text = String::from_utf8_lossy(chunk.as_bytes());
                lines += text.matches('\n').count();
                print!("  data: {}", text);
            }
            TailEvent::Flush { last_read_position } => {
                println!("  flush at byte {}", last_read_position);
                if lines >= 3 {
                    break;
                }
            }
            TailEvent::Error(e) => {
                eprintln!("Error: {}", e);
                break;
            }
            other => println!("  {}", other.name()),
        }
    }

    let position = tail.quit().await;
    println!("Stopped at byte {}", position);

    Ok(())
}
