use std::path::{Path, PathBuf};

use {clap::Subcommand, helpdesk_sessions::SqliteHistoryStore};

#[derive(Subcommand)]
pub enum DbAction {
    /// Delete the history database (and its WAL/SHM files).
    Reset,
    /// Create the database if needed and apply pending migrations.
    Migrate,
}

pub async fn handle_db(action: DbAction, db_path: &Path) -> anyhow::Result<()> {
    match action {
        DbAction::Reset => reset_database(db_path),
        DbAction::Migrate => run_migrations(db_path).await,
    }
}

/// The database file plus the sidecar files SQLite may leave next to it.
fn database_files(db_path: &Path) -> Vec<PathBuf> {
    let mut files = vec![db_path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_os_string();
        name.push(suffix);
        files.push(PathBuf::from(name));
    }
    files
}

fn reset_database(db_path: &Path) -> anyhow::Result<()> {
    let mut deleted = false;
    for path in database_files(db_path) {
        if path.exists() {
            std::fs::remove_file(&path)?;
            println!("Deleted: {}", path.display());
            deleted = true;
        }
    }

    if deleted {
        println!("Database deleted. Run `helpdesk db migrate` to recreate it.");
    } else {
        println!("No database found at {}.", db_path.display());
    }
    Ok(())
}

async fn run_migrations(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let store = SqliteHistoryStore::open(db_path).await?;
    store.pool().close().await;
    println!("Migrations applied: {}", db_path.display());
    Ok(())
}
