//! Interactive shell
//!
//! Reads one command per line and replies with plain text. Failures are reported back to the
//! user, they never end the shell.
//!
//! Words are separated by whitespace, double quotes keep a word with whitespace together.

use std::fmt::Write as _;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use shop::ProductCode;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};

use crate::context::Context;
use crate::model::session;
use crate::model::users::Registration;

#[cfg(test)]
mod tests;

const PROMPT: &[u8] = b"> ";

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Session(#[from] session::Error),
    #[error("No product with code {0}")]
    UnknownProduct(ProductCode),
    #[error("Unterminated quote")]
    UnterminatedQuote,
}

/// Single shell line
#[derive(Debug, Parser)]
#[command(no_binary_name = true)]
struct Line {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Logs in. Everything after the email is the password.
    Login {
        email: String,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        password: Vec<String>,
    },
    /// Logs out, forgetting the stored session
    Logout,
    /// Shows the logged in user
    Whoami,
    /// Shows the last known totals
    Totals,
    /// Fetches the totals from the server
    Refresh,
    /// Creates a new account. Quote passwords containing whitespace.
    Register {
        username: String,
        email: String,
        password: String,
        /// Password, once more
        confirm: String,
    },
    /// Lists products on offer
    Catalog,
    /// Puts a product in the cart
    Add { code: ProductCode },
    /// Shows the cart content
    Cart,
    /// Leaves the shell
    #[command(alias = "exit")]
    Quit,
}

/// Runs the shell until the input ends or `quit` is entered
pub async fn run<R, W>(context: &Context, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    output.write_all(PROMPT).await?;
    output.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let reply = match split_words(&line) {
            Ok(words) if words.is_empty() => None,
            Ok(words) => match Line::try_parse_from(words) {
                Ok(Line {
                    command: Command::Quit,
                }) => break,
                Ok(Line { command }) => Some(
                    execute(context, command)
                        .await
                        .unwrap_or_else(|err| format!("error: {err}")),
                ),
                Err(err) => Some(err.to_string()),
            },
            Err(err) => Some(format!("error: {err}")),
        };

        if let Some(mut reply) = reply {
            if !reply.ends_with('\n') {
                reply.push('\n');
            }
            output.write_all(reply.as_bytes()).await?;
        }

        output.write_all(PROMPT).await?;
        output.flush().await?;
    }

    debug!("Shell input finished");
    Ok(())
}

/// Splits a line into words
///
/// Inside double quotes whitespace does not separate words, and `\"` and `\\` stand for a quote
/// and a backslash.
fn split_words(line: &str) -> Result<Vec<String>, Error> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            '\\' if quoted && matches!(chars.peek(), Some('"' | '\\')) => {
                word.extend(chars.next());
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            c => {
                word.push(c);
                in_word = true;
            }
        }
    }

    if quoted {
        return Err(Error::UnterminatedQuote);
    }
    if in_word {
        words.push(word);
    }
    Ok(words)
}

/// Executes a single command, returning the reply
#[instrument(skip_all)]
pub async fn execute(context: &Context, command: Command) -> Result<String, Error> {
    let session = context.session();

    let reply = match command {
        Command::Login { email, password } => {
            let user = session.login(&email, &password.join(" ")).await?;
            format!("Logged in as {}", user.username)
        }

        Command::Logout => {
            session.logout().await?;
            "Logged out".to_owned()
        }

        Command::Whoami => match session.user().await {
            Some(user) => format!(
                "{} <{}> ({})\navatar: {}",
                user.username, user.email, user.role, user.avatar
            ),
            None => "Not logged in".to_owned(),
        },

        Command::Totals => {
            let state = session.state().await;
            if !state.is_authenticated() {
                return Err(session::Error::Unauthenticated.into());
            }
            render_totals(&state.totals)
        }

        Command::Refresh => render_totals(&session.fetch_totals().await?),

        Command::Register {
            username,
            email,
            password,
            confirm,
        } => {
            let registration = Registration {
                username,
                email,
                password1: password,
                password2: confirm,
            };
            session.register(&registration).await?;
            format!(
                "Account {} created, you can log in now",
                registration.username
            )
        }

        Command::Catalog => {
            let products = context.catalog().products();
            if products.is_empty() {
                return Ok("Catalog is empty".to_owned());
            }

            let mut reply = String::new();
            for product in products {
                let _ = writeln!(
                    reply,
                    "#{} {} - ${} [{}]",
                    product.code,
                    product.name,
                    product.price,
                    product.stock_status()
                );
            }
            reply
        }

        Command::Add { code } => {
            let product = context
                .catalog()
                .get(code)
                .ok_or(Error::UnknownProduct(code))?;

            let mut cart = context.cart().await;
            cart.add(product.entry());
            format!("Added {}, cart total: ${}", product.name, cart.total())
        }

        Command::Cart => {
            let cart = context.cart().await;
            if cart.is_empty() {
                return Ok("Cart is empty".to_owned());
            }

            let mut reply = String::new();
            for entry in cart.entries() {
                let _ = writeln!(reply, "#{} {} - ${}", entry.code, entry.name, entry.price);
            }
            let _ = write!(reply, "Total: ${}", cart.total());
            reply
        }

        Command::Quit => String::new(),
    };

    Ok(reply)
}

fn render_totals(totals: &crate::model::totals::Totals) -> String {
    format!(
        "income: {:.2}\nexpense: {:.2}\nbalance: {:.2}",
        totals.income, totals.expense, totals.balance
    )
}
