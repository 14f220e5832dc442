//! 引导阶段：从自由文本里取名字和年龄，并按年龄分流

use std::collections::HashSet;

use regex::Regex;

use crate::config::DialogueSection;
use crate::guardrail::Lexicon;
use crate::session::Mode;

/// 短回复里跳过的问候 / 功能词
const NOT_A_NAME: &[&str] = &[
    "hi", "hello", "hey", "hiya", "yo", "sup", "howdy", "greetings", "good", "morning",
    "afternoon", "evening", "i", "im", "i'm", "my", "name", "is", "it's", "its", "call", "me",
    "the", "a", "yes", "yeah", "no", "ok", "okay", "hmm", "um", "uh", "what", "why", "who",
    "there", "thanks",
];

/// 出现即说明这句话不是在报名字（否定、语气、状态词）；情绪词与敷衍词从护栏词表补充
const NEVER_A_NAME: &[&str] = &[
    "not", "fine", "sure", "whatever", "just", "really", "very", "so", "feeling", "here",
    "back", "done", "tired", "happy", "bad", "busy", "alright", "kidding", "joking", "nobody",
    "nothing", "confused", "lost", "sorry", "years", "old",
];

const NUMBER_WORDS: &[(&str, u8)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("thirteen", 13),
    ("fourteen", 14),
    ("fifteen", 15),
    ("sixteen", 16),
    ("seventeen", 17),
    ("eighteen", 18),
    ("nineteen", 19),
    ("twenty", 20),
];

const MAX_AGE: u32 = 120;

pub struct OnboardingParser {
    name_intro: Regex,
    digits: Regex,
    /// "I'm 9" / "9 years old" / "age nine" 这类明确说年龄的句式
    stated_age: Regex,
    stopwords: HashSet<&'static str>,
    rejected: HashSet<String>,
}

impl OnboardingParser {
    /// 使用内置护栏词表
    pub fn new() -> Result<Self, regex::Error> {
        Self::from_lexicon(&Lexicon::default())
    }

    pub fn from_lexicon(lexicon: &Lexicon) -> Result<Self, regex::Error> {
        let number_words = NUMBER_WORDS
            .iter()
            .map(|(w, _)| *w)
            .collect::<Vec<_>>()
            .join("|");
        let token = format!(r"(\d{{1,3}}|{number_words})");
        let stated_age = format!(
            r"(?i)\b(?:i am|i'm|im|age|aged|turning)\s+{token}\b|\b{token}\s*(?:years?|yrs?|y/?o)\b"
        );

        let rejected = NEVER_A_NAME
            .iter()
            .map(|w| w.to_string())
            .chain(lexicon.emotions.iter().flat_map(|e| e.keywords.iter().cloned()))
            .chain(lexicon.dismissive.iter().cloned())
            .map(|w| w.to_lowercase())
            .collect();

        Ok(Self {
            name_intro: Regex::new(
                r"(?i)\b(?:my name is|my name's|name's|i am|i'm|im|call me|this is)\s+([a-z][a-z'\-]*)",
            )?,
            digits: Regex::new(r"\b(\d{1,3})\b")?,
            stated_age: Regex::new(&stated_age)?,
            stopwords: NOT_A_NAME.iter().copied().collect(),
            rejected,
        })
    }

    fn is_rejected(&self, word: &str) -> bool {
        self.rejected.contains(word.to_lowercase().as_str())
    }

    /// "my name is X" / "I'm X" / "call me X"，或不超过 3 个词的短回复里第一个字母词
    ///
    /// 情绪词、敷衍词、否定与语气词不会被当成名字（"I'm scared"、"I am not sure"、"whatever dude"）。
    pub fn extract_name(&self, message: &str) -> Option<String> {
        if let Some(caps) = self.name_intro.captures(message) {
            let candidate = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let lowered = candidate.to_lowercase();
            if !self.stopwords.contains(lowered.as_str()) && !self.is_rejected(&lowered) {
                return Some(capitalize(candidate));
            }
        }

        let words: Vec<&str> = message
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphabetic() && c != '\''))
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() || words.len() > 3 || words.iter().any(|w| self.is_rejected(w)) {
            return None;
        }
        words
            .into_iter()
            .filter(|w| w.chars().all(|c| c.is_alphabetic() || c == '\''))
            .find(|w| !self.stopwords.contains(w.to_lowercase().as_str()))
            .map(capitalize)
    }

    /// 第一个 1..=120 的整数，或 one..twenty 的英文数字
    pub fn extract_age(&self, message: &str) -> Option<u8> {
        if let Some(caps) = self.digits.captures(message) {
            let value: u32 = caps.get(1)?.as_str().parse().ok()?;
            return (1..=MAX_AGE).contains(&value).then_some(value as u8);
        }
        let lowered = message.to_lowercase();
        lowered.split(|c: char| !c.is_alphabetic()).find_map(number_word)
    }

    /// 只认明确的年龄句式；用于同一句里刚给出名字的情况（"I have 2 dogs" 不算年龄）
    pub fn extract_stated_age(&self, message: &str) -> Option<u8> {
        let caps = self.stated_age.captures(message)?;
        let token = caps.get(1).or_else(|| caps.get(2))?.as_str().to_lowercase();
        let value = match token.parse::<u32>() {
            Ok(n) => n,
            Err(_) => u32::from(number_word(&token)?),
        };
        (1..=MAX_AGE).contains(&value).then_some(value as u8)
    }
}

/// 年龄分流：未成年区间 -> GuidedTeaching；成年 -> AdultTrack；之间（青少年）-> OpenTopic；
/// 低于下限按 GuidedTeaching 处理
pub fn route_by_age(age: u8, config: &DialogueSection) -> Mode {
    if age >= config.adult_age {
        Mode::AdultTrack
    } else if age <= config.minor_age_max {
        Mode::GuidedTeaching
    } else {
        Mode::OpenTopic
    }
}

fn number_word(word: &str) -> Option<u8> {
    NUMBER_WORDS
        .iter()
        .find(|(w, _)| *w == word)
        .map(|(_, n)| *n)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
