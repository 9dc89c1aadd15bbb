use std::io::{self, IsTerminal, Read};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wormhole_evm_sim::{
    decode_message_published, double_keccak256, log_message_published_topic, recover_signer,
    BatchVaa, RawLog, SetMessageFee, SignedVaa, TestGuardian, Vaa, BATCH_VAA_VERSION,
    DEFAULT_GOVERNANCE_CONTRACT, GOVERNANCE_CONSISTENCY_LEVEL, VAA_VERSION,
};

#[derive(Parser)]
#[command(name = "evm-vaa-sim")]
#[command(about = "Sign simulated Wormhole VAAs with a test guardian")]
struct Cli {
    /// Guardian private key (hex, 32 bytes). Defaults to the devnet guardian.
    #[arg(long, env = "GUARDIAN_PRIVATE_KEY", hide_env_values = true)]
    guardian_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the guardian's Ethereum address
    Guardian,

    /// Sign a LogMessagePublished log as a version-1 VAA
    ///
    /// Example:
    ///   evm-vaa-sim sign --chain 2 --emitter 0x...  <LOG_DATA_HEX>
    Sign {
        /// Emitter chain ID to stamp on the VAA
        #[arg(long)]
        chain: u16,

        /// Emitter (log topic 1), 20- or 32-byte hex
        #[arg(long)]
        emitter: String,

        /// Guardian set index to stamp on the VAA
        #[arg(long, default_value_t = 0)]
        guardian_set_index: u32,

        /// Observation timestamp (defaults to now)
        #[arg(long, env = "VAA_TIMESTAMP")]
        timestamp: Option<u32>,

        /// Log data (hex string, @file, or stdin)
        data: Option<String>,
    },

    /// Build a SetMessageFee governance payload, or a signed VAA with --sign
    FeePayload {
        /// Chain the fee applies to
        #[arg(long)]
        chain: u16,

        /// New message fee
        #[arg(long)]
        fee: u128,

        /// Wrap the payload in a governance VAA signed by the guardian
        #[arg(long)]
        sign: bool,

        #[arg(long, default_value_t = 1)]
        governance_chain: u16,

        /// Governance emitter (32-byte hex)
        #[arg(long)]
        governance_contract: Option<String>,

        #[arg(long, default_value_t = 0)]
        guardian_set_index: u32,

        #[arg(long, env = "VAA_TIMESTAMP")]
        timestamp: Option<u32>,
    },

    /// Decode a signed version-1 or version-2 VAA and recover its signers
    Inspect {
        /// Signed VAA (hex string, @file, or stdin)
        vaa: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::Guardian => cmd_guardian(&cli),
        Command::Sign {
            chain,
            emitter,
            guardian_set_index,
            timestamp,
            data,
        } => cmd_sign(
            &cli,
            *chain,
            emitter,
            *guardian_set_index,
            *timestamp,
            data.clone(),
        ),
        Command::FeePayload {
            chain,
            fee,
            sign,
            governance_chain,
            governance_contract,
            guardian_set_index,
            timestamp,
        } => {
            let payload = SetMessageFee::from_u128(*chain, *fee).encode();
            if !sign {
                println!("{}", hex::encode(payload));
                return Ok(());
            }
            let emitter_address = match governance_contract {
                Some(contract) => parse_bytes32(contract).context("invalid governance contract")?,
                None => DEFAULT_GOVERNANCE_CONTRACT,
            };
            let mut vaa = Vaa::new(*governance_chain, emitter_address, 0, payload);
            vaa.timestamp = timestamp.unwrap_or_else(now);
            vaa.consistency_level = GOVERNANCE_CONSISTENCY_LEVEL;
            vaa.guardian_set_index = *guardian_set_index;
            let guardian = load_guardian(&cli)?;
            let signed = vaa.sign(&guardian);

            eprintln!("SetMessageFee for chain {}: {}", chain, fee);
            eprintln!("  Digest: 0x{}", hex::encode(vaa.hash));
            println!("{}", hex::encode(signed));
            Ok(())
        }
        Command::Inspect { vaa } => cmd_inspect(vaa.clone()),
    }
}

fn cmd_guardian(cli: &Cli) -> Result<()> {
    let guardian = load_guardian(cli)?;
    eprintln!("public key: 0x{}", hex::encode(guardian.public_key.serialize()));
    println!("0x{}", hex::encode(guardian.eth_address));
    Ok(())
}

fn cmd_sign(
    cli: &Cli,
    chain: u16,
    emitter: &str,
    guardian_set_index: u32,
    timestamp: Option<u32>,
    data_arg: Option<String>,
) -> Result<()> {
    let data = read_input(data_arg)?;
    let log = RawLog {
        address: [0u8; 20],
        topics: vec![
            log_message_published_topic(),
            parse_bytes32(emitter).context("invalid emitter")?,
        ],
        data,
    };

    let mut vaa = decode_message_published(&log).context("decoding log data")?;
    vaa.version = VAA_VERSION;
    vaa.timestamp = timestamp.unwrap_or_else(now);
    vaa.emitter_chain = chain;
    vaa.guardian_set_index = guardian_set_index;

    let guardian = load_guardian(cli)?;
    let signed = vaa.sign(&guardian);

    eprintln!("Signed VAA for sequence {}", vaa.sequence);
    eprintln!("  Emitter: {}/0x{}", chain, hex::encode(vaa.emitter_address));
    eprintln!("  Nonce: {}", vaa.nonce);
    eprintln!("  Guardian: 0x{}", hex::encode(guardian.eth_address));
    eprintln!("  Digest: 0x{}", hex::encode(vaa.hash));
    println!("{}", hex::encode(signed));
    Ok(())
}

fn cmd_inspect(vaa_arg: Option<String>) -> Result<()> {
    let raw = read_input(vaa_arg)?;
    match raw.first() {
        Some(&VAA_VERSION) => {
            let signed = SignedVaa::parse(&raw).context("parsing signed VAA")?;
            let vaa = signed.to_vaa().context("parsing VAA body")?;
            let digest = double_keccak256(&signed.body);

            println!("version: 1");
            println!("guardian set index: {}", vaa.guardian_set_index);
            print_observation(&vaa);
            println!("digest: 0x{}", hex::encode(digest));
            print_signers(&digest, &signed.signatures);
        }
        Some(&BATCH_VAA_VERSION) => {
            let batch = BatchVaa::parse(&raw).context("parsing batch VAA")?;
            let digest = batch.digest();

            println!("version: 2");
            println!("guardian set index: {}", batch.guardian_set_index);
            println!("digest: 0x{}", hex::encode(digest));
            print_signers(&digest, &batch.signatures);
            for (index, (hash, observation)) in
                batch.hashes.iter().zip(&batch.observations).enumerate()
            {
                let vaa = Vaa::from_body(observation)
                    .with_context(|| format!("parsing observation {}", index))?;
                println!("observation {}: 0x{}", index, hex::encode(hash));
                print_observation(&vaa);
            }
        }
        Some(version) => bail!("unsupported VAA version: {}", version),
        None => bail!("empty VAA"),
    }
    Ok(())
}

fn print_observation(vaa: &Vaa) {
    println!("  timestamp: {}", vaa.timestamp);
    println!("  nonce: {}", vaa.nonce);
    println!(
        "  emitter: {}/0x{}",
        vaa.emitter_chain,
        hex::encode(vaa.emitter_address)
    );
    println!("  sequence: {}", vaa.sequence);
    println!("  consistency level: {}", vaa.consistency_level);
    println!("  payload: 0x{}", hex::encode(&vaa.payload));
}

fn print_signers(digest: &[u8; 32], signatures: &[wormhole_evm_sim::GuardianSignature]) {
    for signature in signatures {
        match recover_signer(digest, signature) {
            Ok(address) => println!(
                "signature {}: 0x{}",
                signature.guardian_index,
                hex::encode(address)
            ),
            Err(e) => println!("signature {}: invalid ({:?})", signature.guardian_index, e),
        }
    }
}

fn load_guardian(cli: &Cli) -> Result<TestGuardian> {
    let secret_key = match &cli.guardian_key {
        Some(key) => parse_bytes32(key).context("invalid guardian key")?,
        None => wormhole_evm_sim::DEFAULT_GUARDIAN_SECRET_KEY,
    };
    TestGuardian::try_new(secret_key, 0)
        .map_err(|e| anyhow::anyhow!("invalid guardian key: {:?}", e))
}

/// Parse hex into a 32-byte word. 20-byte inputs are left-padded.
fn parse_bytes32(s: &str) -> Result<[u8; 32]> {
    let bytes = decode_hex(s)?;
    let mut word = [0u8; 32];
    match bytes.len() {
        20 => word[12..].copy_from_slice(&bytes),
        32 => word.copy_from_slice(&bytes),
        len => bail!("expected 20 or 32 bytes, got {}", len),
    }
    Ok(word)
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).context("decoding hex")
}

/// Read input from hex string argument, @file reference, or stdin.
fn read_input(arg: Option<String>) -> Result<Vec<u8>> {
    match arg {
        Some(s) if s.starts_with('@') => {
            let path = &s[1..];
            let contents =
                std::fs::read_to_string(path).with_context(|| format!("reading file: {}", path))?;
            decode_hex(&contents).context("decoding hex from file")
        }
        Some(s) => decode_hex(&s),
        None => {
            if io::stdin().is_terminal() {
                bail!("no input provided; pass as argument, @file, or pipe to stdin");
            }
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            decode_hex(&buf).context("decoding hex from stdin")
        }
    }
}

fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or_default()
}
