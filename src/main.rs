use clap::{Parser, Subcommand};
use std::path::PathBuf;

use brightchain::store::handle::TUPLE_SIZE;
use brightchain::{
    Block, BlockDataType, BlockHandleTuple, BlockMetadata, BlockOptions, BlockSize, BlockType,
    ChecksumBuffer, DiskBlockStore,
};

#[derive(Parser)]
#[command(name = "brightchain", version = "1.0.0", about = "BrightChain block store CLI")]
struct Cli {
    /// Store base directory (holds one subdirectory per block size)
    #[arg(short, long, default_value = ".")]
    store: PathBuf,

    /// Block size: message, tiny, small, medium, large, huge
    #[arg(short, long, default_value = "small")]
    block_size: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store directory tree
    Init,
    /// Frame a file into a single block (random-padded) and store it
    Put {
        input: PathBuf,
    },
    /// Write a stored block's full data to a file
    Get {
        checksum: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show block count and byte usage
    Info,
    /// Sample up to N random block addresses
    Random {
        #[arg(default_value = "10")]
        count: usize,
    },
    /// XOR a tuple of stored blocks and store the derived block
    Xor {
        /// Exactly three block checksums (hex)
        #[arg(num_args = 3)]
        checksums: Vec<String>,
    },
    /// Whiten a file: store it XORed against random blocks, print the tuple
    Whiten {
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let size = BlockSize::from_label(&cli.block_size)
        .ok_or_else(|| format!("Unknown block size '{}'", cli.block_size))?;
    let store = DiskBlockStore::new(&cli.store, size)?;

    match cli.command {

        // ── Init ─────────────────────────────────────────────────────────────
        Commands::Init => {
            println!("Initialized {} store at {}", size, store.root().display());
        }

        // ── Put ──────────────────────────────────────────────────────────────
        Commands::Put { input } => {
            let data = std::fs::read(&input)?;
            let block = Block::new(
                BlockType::RawData,
                BlockDataType::RawData,
                size,
                &data,
                BlockOptions::default(),
            )?;
            let handle = store.set_data(&block)?;
            println!("{}", handle.checksum());
        }

        // ── Get ──────────────────────────────────────────────────────────────
        Commands::Get { checksum, output } => {
            let checksum = ChecksumBuffer::from_hex(&checksum)?;
            let block = store.get_data(&checksum)?;
            std::fs::write(&output, block.data())?;
            println!("Wrote {} B to {}", block.data().len(), output.display());
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info => {
            let (blocks, bytes) = store.usage()?;
            println!("── BrightChain store ────────────────────────────────────");
            println!("  Root        {}", store.root().display());
            println!("  Block size  {} ({} B)", size, size.len());
            println!("  Blocks      {}", blocks);
            println!("  Bytes       {} ({:.2} MiB)", bytes, bytes as f64 / 1048576.0);
        }

        // ── Random ───────────────────────────────────────────────────────────
        Commands::Random { count } => {
            let checksums = store.random_checksums(count)?;
            for checksum in &checksums {
                println!("{checksum}");
            }
            if checksums.len() < count {
                eprintln!("(store only holds {} sampleable blocks)", checksums.len());
            }
        }

        // ── Xor ──────────────────────────────────────────────────────────────
        Commands::Xor { checksums } => {
            let handles = checksums
                .iter()
                .map(|hex| Ok(store.get(&ChecksumBuffer::from_hex(hex)?)))
                .collect::<Result<Vec<_>, Box<dyn std::error::Error>>>()?;
            let tuple = BlockHandleTuple::new(handles)?;
            let handle =
                tuple.xor_to_store(&store, BlockMetadata::now(size.len() as u64))?;
            println!("{}", handle.checksum());
        }

        // ── Whiten ───────────────────────────────────────────────────────────
        Commands::Whiten { input } => {
            let data = std::fs::read(&input)?;
            let block = Block::new(
                BlockType::RawData,
                BlockDataType::RawData,
                size,
                &data,
                BlockOptions::default(),
            )?;
            let (_, addresses) = store.whiten(&block)?;
            println!("Tuple ({} blocks; XOR all to reconstruct):", TUPLE_SIZE);
            for address in &addresses {
                println!("  {address}");
            }
        }
    }

    Ok(())
}
