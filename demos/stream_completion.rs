//! Streams a deobfuscation answer to stdout.
//!
//! Run with:
//! ```bash
//! export JSUNPACK_BASE_URL="http://localhost:3000"
//! cargo run --example stream_completion -- path/to/snippet.js
//! ```
//!
//! Without a path a bundled minified snippet is sent. Ctrl-C cancels the
//! stream.

use std::io::Write;
use std::sync::Arc;

use jsunpack::http::HttpOpener;
use jsunpack::options::{validate_input, TransportOptions, DEFAULT_MAX_INPUT_CHARS};
use jsunpack::session::{CookieIdentity, SessionContext};
use jsunpack::{ClientError, SessionOutcome, StreamClient, StreamHandler};

const DEMO_SNIPPET: &str = r#"!function(r=100){if("number"!=typeof r||r<1)throw new Error("please input number");const t=r=>{if(r<2)return!1;for(let t=2,e=Math.sqrt(r);t<=e;t++)if(r%t===0)return!1;return!0},e=[];for(let n=1;n<=r;n++){t(String(n*n).split("").reduce(((r,t)=>r+ +t),0))&&e.push(n)}}();"#;

/// Prints fragments as they arrive and keeps the full answer.
struct Printer {
    answer: String,
}

impl StreamHandler for Printer {
    fn on_payload(&mut self, content: &str) {
        self.answer.push_str(content);
        print!("{}", content);
        // Flush stdout to show text immediately
        let _ = std::io::stdout().flush();
    }

    fn on_complete(&mut self) {
        println!("\n\n=== Stream Complete ===");
    }

    fn on_error(&mut self, error: &ClientError) {
        eprintln!("\n\nError in stream: {}", error);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let input = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(path)?,
        None => DEMO_SNIPPET.to_string(),
    };
    validate_input(&input, DEFAULT_MAX_INPUT_CHARS)?;

    let opener = HttpOpener::new(&TransportOptions::from_env()?)?;
    let client = Arc::new(StreamClient::new(opener));

    let identity = CookieIdentity::new(".jsunpack/cookie.json");
    tracing::debug!(path = %identity.path().display(), "visitor cookie");
    let page_url = std::env::var("JSUNPACK_PAGE_URL")
        .unwrap_or_else(|_| "http://localhost:3000/".to_string());
    let context = SessionContext::for_page(&identity, &page_url)?;

    {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                client.cancel();
            }
        });
    }

    let mut printer = Printer {
        answer: String::new(),
    };
    let outcome = client.start(input, &context, &mut printer).await;

    match outcome {
        SessionOutcome::Completed { payloads, dropped } => {
            println!("Fragments: {} (skipped {})", payloads, dropped);
            for (i, block) in jsunpack::extract_code_blocks(&printer.answer).iter().enumerate() {
                println!("\n--- code block {} ---\n{}", i + 1, block);
            }
        }
        SessionOutcome::Cancelled => println!("\n\n=== Cancelled ==="),
        SessionOutcome::Failed(e) => return Err(e.to_string().into()),
    }

    Ok(())
}
