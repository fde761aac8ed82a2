//! CLI auth command handlers for login, status, and logout.

use std::sync::Arc;

use super::LoginArgs;
use crate::auth::{AuthContext, FileSessionStore, User};
use crate::error::CallError;

fn context() -> Result<AuthContext, CallError> {
    AuthContext::with_store(Arc::new(FileSessionStore::new_default()))
}

/// Handle `ceritain-call auth login`.
pub fn handle_login(args: LoginArgs) -> Result<(), CallError> {
    let user = User {
        id: args.id,
        email: args.email,
        name: args.name,
        avatar: None,
    };
    let email = user.email.clone();
    context()?.login(args.token, user)?;
    println!("Logged in as {email}");
    Ok(())
}

/// Handle `ceritain-call auth status`.
pub fn handle_status() -> Result<(), CallError> {
    match context()?.user() {
        Some(user) => {
            let name = user.name.as_deref().unwrap_or(&user.email);
            println!("Logged in as {name} <{}>", user.email);
        }
        None => println!("Not logged in"),
    }
    Ok(())
}

/// Handle `ceritain-call auth logout`.
pub fn handle_logout() -> Result<(), CallError> {
    context()?.logout()?;
    println!("Logged out");
    Ok(())
}

/// Token from the flag or environment, falling back to the saved login.
pub fn resolve_token(explicit: Option<String>) -> Result<Option<String>, CallError> {
    if explicit.is_some() {
        return Ok(explicit);
    }
    Ok(context()?.token())
}
