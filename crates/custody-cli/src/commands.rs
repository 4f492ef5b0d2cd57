//! Subcommand dispatch and output.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use custody_client::{Client, ClientAction, ClientConfig, ClientEvent, ClientIdentity};
use custody_crypto::parse_program_id;
use custody_proto::{ErrorCode, MaterialView, Pubkey, SignerEntry, TransferRecord};
use custody_server::SystemEnv;

use crate::{
    args::{Cli, Command},
    connection::Connection,
    keyfile,
    session::Session,
};

/// Run the parsed command line.
pub async fn dispatch(cli: Cli) -> Result<()> {
    let config = ClientConfig {
        program_id: parse_program_id(&cli.program_id),
        request_timeout: Duration::from_secs(cli.timeout),
    };

    if !cli.command.needs_server() {
        return run_local(&cli, config);
    }

    let Some(ca) = &cli.ca else {
        bail!("--ca is required: pass the certificate written by `custody-server --write-cert`");
    };

    let keypair = keyfile::load_or_generate(&cli.keypair)?;
    let client = Client::new(SystemEnv::new(), ClientIdentity::new(keypair), config);

    let connection = Connection::connect(&cli.server, &cli.server_name, ca).await?;
    let mut session = Session::new(client, connection);

    let result = run(&mut session, cli.command).await;
    session.close().await;
    result
}

fn run_local(cli: &Cli, config: ClientConfig) -> Result<()> {
    match &cli.command {
        Command::Keygen { force } => {
            let keypair = keyfile::generate()?;
            keyfile::write(&cli.keypair, &keypair, *force)?;
            println!("{}", keypair.pubkey());
        },
        Command::Address { material_id } => {
            println!("{}", offline_client(config).record_address(material_id)?);
        },
        other => bail!("{other:?} needs a server"),
    }
    Ok(())
}

async fn run(session: &mut Session, command: Command) -> Result<()> {
    match command {
        Command::Init { material_id } => {
            let view = expect_record(
                session.call(ClientEvent::InitializeMaterial { material_id }).await?,
            )?;
            print_view(&view);
        },

        Command::Transfer { material_id, new_holder, notes } => {
            let record = fetch(session, &material_id).await?;
            let view = expect_record(
                session.call(ClientEvent::TransferMaterial { record, new_holder, notes }).await?,
            )?;
            print_view(&view);
        },

        Command::Quarantine { material_id, reason } => {
            let record = fetch(session, &material_id).await?;
            let view = expect_record(
                session.call(ClientEvent::QuarantineMaterial { record, reason }).await?,
            )?;
            print_view(&view);
        },

        Command::Fetch { material_id } => {
            let record = fetch(session, &material_id).await?;
            if let Some(view) = session.client().view(&record) {
                print_view(view);
            }
        },

        Command::History { material_id, from, limit } => {
            let record = session.client().record_address(&material_id)?;
            let event = ClientEvent::ListTransfers { record, from_sequence: from, limit };
            match session.call(event).await? {
                ClientAction::TransfersListed { transfers, .. } => print_history(&transfers),
                other => bail!("unexpected result {other:?}"),
            }
        },

        Command::Materials { limit } => {
            match session.call(ClientEvent::ListMaterials { limit }).await? {
                ClientAction::MaterialsListed(views) => {
                    for view in &views {
                        println!(
                            "{}  {:<20}  seq {:>4}  {:?}  {}",
                            view.record,
                            view.material_id,
                            view.last_sequence,
                            view.status,
                            view.current_holder
                        );
                    }
                },
                other => bail!("unexpected result {other:?}"),
            }
        },

        Command::RegisterSigner { role } => {
            let pubkey = session.client().pubkey();
            let expected_sequence = registration_count(session, pubkey).await?;
            let event = ClientEvent::RegisterSigner { role: role.clone(), expected_sequence };
            match session.call(event).await? {
                ClientAction::Acknowledged { .. } => println!("registered {pubkey} as {role}"),
                other => bail!("unexpected result {other:?}"),
            }
        },

        Command::Signers { after, limit } => {
            match session.call(ClientEvent::ListSigners { after, limit }).await? {
                ClientAction::SignersListed(signers) => print_signers(&signers),
                other => bail!("unexpected result {other:?}"),
            }
        },

        local @ (Command::Keygen { .. } | Command::Address { .. }) => {
            bail!("{local:?} does not talk to a server")
        },
    }

    Ok(())
}

/// Fetch `material_id` into the client's cache and return its address.
async fn fetch(session: &mut Session, material_id: &str) -> Result<Pubkey> {
    let record = session.client().record_address(material_id)?;
    expect_record(session.call(ClientEvent::FetchMaterial { record }).await?)
        .with_context(|| format!("fetching {material_id}"))?;
    Ok(record)
}

/// How many times `pubkey` has registered; zero if it never has.
async fn registration_count(session: &mut Session, pubkey: Pubkey) -> Result<u64> {
    match session.exchange(ClientEvent::FetchSigner { pubkey }).await? {
        ClientAction::SignerFetched(entry) => Ok(entry.sequence),
        ClientAction::RequestFailed { code: ErrorCode::SignerNotFound, .. } => Ok(0),
        ClientAction::RequestFailed { code, message, .. } => {
            bail!("server rejected request ({code:?}): {message}")
        },
        other => bail!("unexpected result {other:?}"),
    }
}

fn expect_record(action: ClientAction) -> Result<MaterialView> {
    match action {
        ClientAction::RecordFetched(view) => Ok(view),
        other => bail!("unexpected result {other:?}"),
    }
}

/// A client that never sends anything, for address derivation.
fn offline_client(config: ClientConfig) -> Client<SystemEnv> {
    let identity = ClientIdentity::new(custody_crypto::Keypair::from_seed([0; 32]));
    Client::new(SystemEnv::new(), identity, config)
}

fn print_view(view: &MaterialView) {
    println!("record:         {}", view.record);
    println!("material id:    {}", view.material_id);
    println!("current holder: {}", view.current_holder);
    println!("last sequence:  {}", view.last_sequence);
    println!("status:         {:?}", view.status);
}

fn print_history(transfers: &[TransferRecord]) {
    if transfers.is_empty() {
        println!("no transfers");
    }
    for t in transfers {
        println!("#{:<4} {} -> {}  at {}  {}", t.sequence, t.from, t.to, t.timestamp, t.notes);
    }
}

fn print_signers(signers: &[SignerEntry]) {
    for s in signers {
        println!("{}  {:<20}  registered {}x", s.pubkey, s.role, s.sequence);
    }
}
