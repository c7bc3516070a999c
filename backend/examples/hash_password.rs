//! Print a bcrypt hash for a password, e.g. to reset an admin row by hand.
//!
//! `cargo run --example hash_password -- <password> [cost]`

use viso_admin_backend::services::auth_service::AuthService;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let password = args.next().ok_or("usage: hash_password <password> [cost]")?;
    let cost = match args.next() {
        Some(cost) => cost.parse()?,
        None => bcrypt::DEFAULT_COST,
    };

    let hashed = AuthService::hash_password_with_cost(&password, cost)?;
    println!("{}", hashed);

    if !AuthService::verify_password(&password, &hashed)? {
        return Err("hash does not verify".into());
    }
    Ok(())
}
