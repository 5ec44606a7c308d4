//! Referral code generation.
//!
//! Shape: PREFIX + RANDOM + SUFFIX, e.g. `JAN7QX2K1P`.
//!   - PREFIX: first alphanumerics of the display name (or the local
//!     part of the contact address), so the owner recognises it.
//!   - RANDOM: characters from CodeRng.
//!   - SUFFIX: the tail of the creation time in base 36.
//!
//! After `max_attempts` collisions the generator switches to the
//! fallback shape: a fixed marker followed by random characters.
//! Persisting the code is the caller's job; see registration.rs.

use chrono::{DateTime, Utc};

use crate::{config::CodeConfig, rng::CodeRng};

pub const MIN_CODE_LEN: usize = 6;
pub const MAX_CODE_LEN: usize = 20;

pub struct CodeGenerator {
    config: CodeConfig,
    rng:    CodeRng,
}

impl CodeGenerator {
    pub fn new(config: CodeConfig, rng: CodeRng) -> Self {
        Self { config, rng }
    }

    /// An independent generator for another worker.
    pub fn fork(&mut self) -> Self {
        Self::new(self.config.clone(), self.rng.split())
    }

    /// Name-derived attempts before the fallback shape kicks in.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// The candidate for a given 0-based attempt number.
    pub fn candidate(
        &mut self,
        display_name: &str,
        contact: &str,
        now: DateTime<Utc>,
        attempt: u32,
    ) -> String {
        if attempt < self.config.max_attempts {
            self.generate(display_name, contact, now)
        } else {
            self.fallback()
        }
    }

    pub fn generate(&mut self, display_name: &str, contact: &str, now: DateTime<Utc>) -> String {
        let mut code = prefix(display_name, contact, self.config.prefix_len);
        code.push_str(&self.rng.code_chars(self.config.random_len));
        code.push_str(&time_suffix(now, self.config.suffix_len));
        code
    }

    pub fn fallback(&mut self) -> String {
        format!(
            "{}{}",
            self.config.fallback_marker,
            self.rng.code_chars(self.config.fallback_random_len)
        )
    }
}

/// `^[A-Z0-9]{6,20}$`
pub fn is_well_formed(code: &str) -> bool {
    (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&code.len())
        && code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

fn alnum_upper(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn prefix(display_name: &str, contact: &str, len: usize) -> String {
    let local_part = contact.split('@').next().unwrap_or_default();
    let source = [alnum_upper(display_name), alnum_upper(local_part)]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| "USR".to_string());
    let mut p: String = source.chars().take(len).collect();
    while p.len() < len {
        p.push('X');
    }
    p
}

fn time_suffix(now: DateTime<Utc>, len: usize) -> String {
    const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut n = now.timestamp_millis().unsigned_abs();
    let mut out = vec![b'0'; len];
    for slot in out.iter_mut().rev() {
        *slot = DIGITS[(n % 36) as usize];
        n /= 36;
    }
    out.into_iter().map(char::from).collect()
}
