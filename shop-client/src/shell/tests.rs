//! Shell tests running scripted sessions

use shop::Catalog;
use tokio::io::BufReader;

use crate::context::Context;
use crate::shell;


const CATALOG: &str = r#"
    [[products]]
    id = 1
    code = 1001
    name = "Product A"
    stock = 2
    price = 150000

    [[products]]
    id = 2
    code = 1002
    name = "Product B"
    stock = 0
    price = 90000

    [[products]]
    id = 3
    code = 1003
    name = "Product C"
    stock = 8
    price = 80000
"#;

fn catalog() -> Catalog {
    Catalog::from_toml(CATALOG).unwrap()
}

/// Runs the script through the shell, returning replies with prompts stripped
async fn script(context: &Context, script: &str) -> Vec<String> {
    let mut output = Vec::new();
    shell::run(context, BufReader::new(script.as_bytes()), &mut output)
        .await
        .unwrap();

    let output = String::from_utf8(output).unwrap();
    output
        .strip_prefix("> ")
        .unwrap_or(&output)
        .split("\n> ")
        .filter(|reply| !reply.is_empty())
        .map(str::to_owned)
        .collect()
}

#[test]
fn splitting_words() {
    let words = |line| shell::split_words(line).unwrap();

    assert_eq!(words("  login  ana@example.com  secret "), ["login", "ana@example.com", "secret"]);
    assert_eq!(
        words(r#"register maria maria@example.com "my pass" "my pass""#),
        ["register", "maria", "maria@example.com", "my pass", "my pass"]
    );
    assert_eq!(words(r#"login a@b "" x"#), ["login", "a@b", "", "x"]);
    assert_eq!(words(r#""say \"hi\"" C:\dir "\\""#), [r#"say "hi""#, r"C:\dir", r"\"]);
    assert!(words("   ").is_empty());
}

#[test]
fn unterminated_quote_rejected() {
    assert!(matches!(
        shell::split_words(r#"login a@b "open"#),
        Err(shell::Error::UnterminatedQuote)
    ));
}
