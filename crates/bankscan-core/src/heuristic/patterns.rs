//! Regex patterns and bilingual keyword sets for statement line scanning.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Date token: YYYY/MM/DD or YYYY-MM-DD.
    pub static ref DATE_TOKEN: Regex = Regex::new(
        r"(\d{4}[/\-]\d{2}[/\-]\d{2})"
    ).unwrap();

    /// Amount token: optional thousands groups, exactly two fraction digits.
    pub static ref AMOUNT_TOKEN: Regex = Regex::new(
        r"\d{1,3}(?:,\d{3})+\.\d{2}|\d+\.\d{2}"
    ).unwrap();

    /// Inbound movement keywords; anything else defaults to a withdrawal
    /// since statements enumerate debits line by line far more often.
    pub static ref DEPOSIT_KEYWORD: Regex = Regex::new(
        r"存入|存款|轉入|(?i:deposit|credit)"
    ).unwrap();

    /// Statement category tokens, used as the transaction description.
    pub static ref CATEGORY_TOKEN: Regex = Regex::new(
        r"交換票\s*[\w\-]*|現金交易|自動轉賬|銀行費用|存入|存款|轉入|提取|(?i:transfer|deposit|withdrawal|cheque|interest|charge|atm)"
    ).unwrap();
}
