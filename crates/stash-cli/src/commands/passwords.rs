use stash_core::crypto::{check_password_strength, generate_password};

use crate::cli::{PassgenArgs, StrengthArgs};
use crate::helpers::read_password;

pub fn handle_passgen(args: &PassgenArgs) -> anyhow::Result<()> {
    let password = generate_password(args.length, !args.no_symbols)?;
    println!("{}", password);
    Ok(())
}

pub fn handle_strength(args: &StrengthArgs) -> anyhow::Result<()> {
    let strength = match &args.password {
        Some(password) => check_password_strength(password),
        None => check_password_strength(&read_password("Password to rate")?),
    };
    println!("{}", strength);
    Ok(())
}
