//! Account command handlers

use crate::services::{Account, AccountError, AccountService, NewAccount};

fn print_account(account: &Account) {
    println!("{} <{}>", account.name, account.email);
    println!("  ID: {}", account.id);
    match &account.activated_at {
        Some(at) => println!("  Activated: {at}"),
        None => println!("  Activated: no"),
    }
    println!("  Created: {}", account.created_at);
}

fn report(err: AccountError) -> anyhow::Error {
    if let AccountError::ValidationFailed(errors) = &err {
        for field_error in errors {
            println!("  - {field_error}");
        }
    }
    anyhow::Error::new(err)
}

pub async fn cmd_register(
    accounts: &impl AccountService,
    name: String,
    email: String,
    password: String,
) -> anyhow::Result<()> {
    let account = accounts
        .register(NewAccount {
            name,
            email,
            password,
            password_confirmation: None,
        })
        .await
        .map_err(report)?;

    println!("Registered account {}.", account.id);
    println!("Check the activation email sent to {}.", account.email);
    Ok(())
}

pub async fn cmd_activate(
    accounts: &impl AccountService,
    email: &str,
    token: &str,
) -> anyhow::Result<()> {
    let account = accounts.activate(email, token).await.map_err(report)?;

    println!("Account activated!");
    print_account(&account);
    Ok(())
}

pub async fn cmd_login(
    accounts: &impl AccountService,
    email: &str,
    password: &str,
    remember: bool,
) -> anyhow::Result<()> {
    let account = accounts.log_in(email, password).await.map_err(report)?;
    println!("Credentials valid for account {}.", account.id);

    if remember {
        let token = accounts.remember(account.id).await.map_err(report)?;
        println!("user_id={}", account.id);
        println!("remember_token={}", token.as_str());
    }

    Ok(())
}

pub async fn cmd_forget(accounts: &impl AccountService, email: &str) -> anyhow::Result<()> {
    let account = accounts
        .find_by_email(email)
        .await?
        .ok_or(AccountError::NotFound)?;

    accounts.forget(account.id).await?;
    println!("Persistent session cleared for {}.", account.email);
    Ok(())
}

pub async fn cmd_show(accounts: &impl AccountService, email: &str) -> anyhow::Result<()> {
    match accounts.find_by_email(email).await? {
        Some(account) => print_account(&account),
        None => println!("No account for {email}."),
    }
    Ok(())
}
