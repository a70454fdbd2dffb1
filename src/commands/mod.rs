mod addpromo;
mod cancel;
mod grant;
mod pay;
mod promo;
mod start;
mod status;

pub use addpromo::addpromo;
pub use cancel::cancel;
pub use grant::grant;
pub use pay::{pay, send_access_invoice};
pub use promo::{PROMO_USAGE, promo};
pub use start::start;
pub use status::status;

/// Words after the command itself.
fn command_args(text: Option<&str>) -> Vec<&str> {
    text.unwrap_or("").split_whitespace().skip(1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_arguments_after_command() {
        assert_eq!(command_args(Some("/grant 42 30")), vec!["42", "30"]);
        assert_eq!(command_args(Some("/promo@winyl_bot   CODE ")), vec!["CODE"]);
        assert!(command_args(Some("/status")).is_empty());
        assert!(command_args(None).is_empty());
    }
}
