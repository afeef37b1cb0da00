// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test data generators for abuse simulation.

use farewell_letters::letters::LetterInput;
use std::net::{IpAddr, Ipv4Addr};

/// Generate a pool of client addresses.
pub fn generate_ips(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c)).to_string()
        })
        .collect()
}

/// A letter with the given content at a fixed, valid location.
pub fn letter(content: &str) -> LetterInput {
    LetterInput {
        content: content.to_string(),
        author: Some("Visitante".to_string()),
        is_anonymous: false,
        lat: -19.9167,
        lng: -43.9345,
        city: "Belo Horizonte".to_string(),
    }
}

/// Letters that should be approved without review.
pub fn clean_letters(count: usize) -> Vec<LetterInput> {
    (0..count)
        .map(|i| {
            letter(&format!(
                "Obrigado pela convivência durante {} anos, vou sentir saudade",
                i + 1
            ))
        })
        .collect()
}

/// Spam payloads, each caught by a different hard-block rule.
pub fn spam_payloads() -> Vec<&'static str> {
    vec![
        // Links
        "Visite http://promo.example",
        "acesse www.ganhos.net agora",
        "meu site: lojinha.com.br",
        "HTTPS://SHOUTING.EXAMPLE/x",
        // Spam keywords
        "Compre agora e ganhe um brinde",
        "Renda extra trabalhando pouco",
        "Me chama no WhatsApp",
        "Aposte no pixbet hoje",
        "Invista em bitcoin já",
        // Profanity
        "que porra de despedida",
        "Foda-se essa empresa",
    ]
}

/// Letters that pass the hard block but should be held for review.
pub fn borderline_letters() -> Vec<(&'static str, &'static str)> {
    vec![
        ("oi", "very_short"),
        ("que saudadeeeee de vocês", "repeated_characters"),
        ("foi INESQUECÍVEL demais", "excessive_caps"),
        ("valeu @ana @bruno @carla pela parceria", "multiple_mentions"),
        ("que droga ter que ir embora", "borderline_language"),
        ("sério?? acabou?? não acredito!!", "excessive_punctuation"),
    ]
}

/// Bodies that are not valid letter JSON.
pub const MALFORMED_BODIES: &[&[u8]] = &[
    b"",
    b"{",
    b"not json at all",
    br#"{"content": 42}"#,
    br#"{"content": "sem coordenadas", "city": "Recife"}"#,
    br#"[1, 2, 3]"#,
];
