use sol_rewards::api::{self, AppState, SharedState};
use sol_rewards::{
    Config, FileStorage, HistoryFilter, LocalLedger, ProgressStore, SampleHistory, Session,
    TransferForm, TxKind,
};
use std::error::Error;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

type Input = Lines<BufReader<Stdin>>;

async fn prompt(stdin: &mut Input, label: &str) -> Result<String, Box<dyn Error>> {
    println!("{}", label);
    Ok(stdin.next_line().await?.unwrap_or_default().trim().to_string())
}

async fn print_notifications(state: &SharedState) {
    for note in state.session.lock().await.notes.drain() {
        println!("[{:?}] {}", note.level, note.message);
    }
}

async fn print_transactions(state: &SharedState) {
    let session = state.session.lock().await;
    let records = session.transactions(HistoryFilter::All);
    if records.is_empty() {
        println!("No transactions yet.");
    }
    for tx in records {
        let sign = if tx.kind == TxKind::Send { '-' } else { '+' };
        println!(
            "{} | {:?} | {}{} SOL | {:?} | {}",
            tx.timestamp.format("%Y-%m-%d %H:%M:%S"),
            tx.kind,
            sign,
            tx.amount,
            tx.status,
            tx.signature
        );
    }
}

async fn print_tasks(state: &SharedState) {
    let session = state.session.lock().await;
    let stats = session.progress.stats();
    println!(
        "Earned: {:.2} SOL | Completed: {} | Streak: {} | Level {} ({}/{} XP)",
        stats.total_earned,
        stats.tasks_completed,
        stats.current_streak,
        stats.level,
        stats.experience,
        stats.next_level_exp
    );
    for task in session.progress.tasks() {
        println!(
            "{}. {} [{:?}] {} SOL | {:?} {}%",
            task.id,
            task.title,
            task.difficulty,
            task.reward,
            task.state(),
            task.progress
        );
    }
}

async fn print_rewards(state: &SharedState) {
    let session = state.session.lock().await;
    println!("Balance: {:.4} SOL", session.balance.balance());
    for reward in session.rewards.catalog() {
        println!(
            "{}. {} [{}] {} SOL{}",
            reward.id,
            reward.title,
            reward.category,
            reward.cost,
            if reward.popular { " ⭐" } else { "" }
        );
    }
}

/// Complete a task without holding the session during the delay.
async fn complete_task(state: &SharedState, id: &str) {
    let pending = match state.session.lock().await.begin_completion(id) {
        Ok(Some(pending)) => pending,
        Ok(None) => {
            println!("Task {} is already completed.", id);
            return;
        }
        Err(e) => {
            println!("❌ {}", e);
            return;
        }
    };
    println!("⏳ Completing task...");
    pending.wait().await;
    if let Err(e) = state.session.lock().await.finish_completion(pending) {
        println!("❌ {}", e);
    }
}

async fn redeem_reward(state: &SharedState, id: &str) {
    let pending = match state.session.lock().await.begin_redemption(id) {
        Ok(pending) => pending,
        // Already recorded as a notification.
        Err(_) => return,
    };
    println!("⏳ Redeeming {}...", pending.reward().title);
    pending.wait().await;
    let _ = state.session.lock().await.finish_redemption(pending);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("🌱 Rewards node starting");
    info!("  HTTP API:    {}", config.api_addr);
    info!("  Data dir:    {}", config.data_dir.display());
    info!("  Commitment:  {}", config.commitment);

    std::fs::create_dir_all(&config.data_dir)?;
    let ledger = Arc::new(LocalLedger::open(config.ledger_path())?);
    let account = match ledger.accounts().first() {
        Some((address, _)) => *address,
        None => {
            let created = ledger.create_account(config.faucet_lamports())?;
            println!("Mnemonic (save this!): {}", created.mnemonic);
            created.address
        }
    };
    ledger.connect(account);

    let storage = FileStorage::open(config.storage_path())?;
    let mut session = Session::new(
        ledger.clone(),
        Arc::new(SampleHistory),
        ProgressStore::new(Box::new(storage)),
        &config,
    );
    session.sync_connection().await;
    let state = AppState::shared(session);

    let api_state = state.clone();
    let api_addr = config.api_addr;
    tokio::spawn(async move {
        if let Err(e) = api::start_api_server(api_state, api_addr).await {
            error!("API server stopped: {}", e);
        }
    });

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        println!("\n🌍 Options:");
        println!("1. Refresh Balance");
        println!("2. Send SOL");
        println!("3. View Transactions");
        println!("4. View Tasks");
        println!("5. Start Task");
        println!("6. Complete Task");
        println!("7. Create & Connect Account");
        println!("8. Disconnect Wallet");
        println!("9. Reset Progress");
        println!("10. Redeem Reward");
        println!("11. Exit");

        let choice = match stdin.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => "11".to_string(),
        };

        match choice.trim() {
            "1" => {
                let mut session = state.session.lock().await;
                if let Ok(balance) = session.refresh_balance().await {
                    println!("Balance: {:.4} SOL", balance);
                }
            }
            "2" => {
                let recipient = prompt(&mut stdin, "Recipient Address:").await?;
                let amount = prompt(&mut stdin, "Amount (SOL):").await?;
                let mut session = state.session.lock().await;
                session.form = TransferForm::new(recipient, amount);
                if let Ok(receipt) = session.submit_transfer().await {
                    println!("Signature: {}", receipt.signature);
                }
            }
            "3" => print_transactions(&state).await,
            "4" => print_tasks(&state).await,
            "5" => {
                let id = prompt(&mut stdin, "Task ID:").await?;
                if let Err(e) = state.session.lock().await.start_task(&id) {
                    println!("❌ {}", e);
                }
            }
            "6" => {
                let id = prompt(&mut stdin, "Task ID:").await?;
                complete_task(&state, &id).await;
            }
            "7" => match ledger.create_account(config.faucet_lamports()) {
                Ok(created) => {
                    println!("Mnemonic (save this!): {}", created.mnemonic);
                    ledger.connect(created.address);
                    state.session.lock().await.sync_connection().await;
                }
                Err(e) => println!("❌ {}", e),
            },
            "8" => {
                ledger.disconnect();
                state.session.lock().await.sync_connection().await;
            }
            "9" => {
                if let Err(e) = state.session.lock().await.reset_progress() {
                    println!("❌ {}", e);
                }
            }
            "10" => {
                print_rewards(&state).await;
                let id = prompt(&mut stdin, "Reward ID:").await?;
                redeem_reward(&state, &id).await;
            }
            "11" | "exit" => {
                println!("Exiting...");
                break;
            }
            _ => println!("❌ Invalid choice."),
        }
        print_notifications(&state).await;
    }
    Ok(())
}
