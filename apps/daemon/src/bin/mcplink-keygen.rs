//! Print a fresh base64 master key for MCPLINK_ENCRYPTION_KEY

fn main() -> anyhow::Result<()> {
    let key = mcplink_storage::generate_master_key_base64()?;
    println!("{}", key);
    eprintln!();
    eprintln!("Add this line to your environment or .env file:");
    eprintln!("MCPLINK_ENCRYPTION_KEY={}", key);
    Ok(())
}
