use clap::{Parser, Subcommand};
use std::error::Error;
use tg_filestore::link_codec::{deep_link, DecodedLink, LinkCodec};

#[derive(Parser)]
#[command(name = "link_tool")]
#[command(about = "Encode or decode file-share deep link payloads offline")]
struct Cli {
    /// storage channel id; falls back to DB_CHANNEL from the environment
    #[arg(long, allow_hyphen_values = true)]
    channel: Option<i64>,

    /// bot username used to print full deep links
    #[arg(long)]
    bot: Option<String>,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand)]
enum Action {
    /// encode one message id, or an inclusive range when LAST is given
    Encode { first: i64, last: Option<i64> },
    /// decode a payload (or a full t.me link) back into message ids
    Decode { payload: String },
}

fn channel_from_env() -> Result<i64, Box<dyn Error + Send + Sync>> {
    let raw = std::env::var("DB_CHANNEL")
        .map_err(|_| "pass --channel or set DB_CHANNEL")?;
    Ok(raw.trim().parse()?)
}

/// accepts either a bare payload or a `...?start=<payload>` link
fn extract_payload(input: &str) -> &str {
    input
        .rsplit_once("start=")
        .map(|(_, payload)| payload)
        .unwrap_or(input)
        .trim()
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let channel = match cli.channel {
        Some(channel) => channel,
        None => channel_from_env()?,
    };
    let codec = LinkCodec::new(channel)?;

    match cli.command {
        Action::Encode { first, last } => {
            let payload = match last {
                Some(last) => codec.encode_range(first, last)?,
                None => codec.encode_single(first)?,
            };
            println!("{}", payload);
            if let Some(bot) = cli.bot.as_deref() {
                println!("{}", deep_link(bot.trim_start_matches('@'), &payload));
            }
        }
        Action::Decode { payload } => match codec.decode(extract_payload(&payload))? {
            DecodedLink::Single(id) => println!("message {}", id),
            DecodedLink::Range { first, last } => {
                let count = DecodedLink::Range { first, last }.len();
                println!("messages {}..={} ({} total)", first, last, count);
            }
        },
    }
    Ok(())
}
