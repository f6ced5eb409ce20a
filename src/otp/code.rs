// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use rand::Rng;

/// Uniformly random `digits`-long numeric code with a non-zero first digit.
pub fn generate_otp(digits: u32) -> String {
    let digits = digits.clamp(1, 9);
    let low = 10u32.pow(digits - 1);
    let high = 10u32.pow(digits) - 1;
    rand::rng().random_range(low..=high).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_have_requested_length() {
        for digits in [4, 6, 8] {
            for _ in 0..50 {
                let code = generate_otp(digits);
                assert_eq!(code.len(), digits as usize);
                assert!(code.chars().all(|c| c.is_ascii_digit()));
                assert!(!code.starts_with('0'));
            }
        }
    }
}
