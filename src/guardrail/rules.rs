//! 规则表：有序的（谓词, 标签）列表
//!
//! 每条规则由一组关键词编译成一个词边界、大小写无关的正则；RuleSet 按声明顺序求值，先命中者胜。
//! 词表本身是数据（Lexicon，可序列化），分类器逻辑不含硬编码分支。

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::context::Emotion;

/// 单条规则：关键词命中即产出 label
#[derive(Debug, Clone)]
pub struct Rule<L> {
    pub label: L,
    pattern: Regex,
}

impl<L> Rule<L> {
    pub fn new(label: L, keywords: &[String]) -> Result<Self, regex::Error> {
        Ok(Self {
            label,
            pattern: keyword_regex(keywords)?,
        })
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// 命中次数（用于强度计算）
    pub fn count(&self, text: &str) -> usize {
        self.pattern.find_iter(text).count()
    }
}

/// 有序规则集
#[derive(Debug, Clone)]
pub struct RuleSet<L> {
    rules: Vec<Rule<L>>,
}

impl<L> RuleSet<L> {
    pub fn new(rules: Vec<Rule<L>>) -> Self {
        Self { rules }
    }

    pub fn first_match(&self, text: &str) -> Option<&Rule<L>> {
        self.rules.iter().find(|r| r.matches(text))
    }

    pub fn any_match(&self, text: &str) -> bool {
        self.first_match(text).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule<L>> {
        self.rules.iter()
    }
}

/// 将关键词编译为 `(?i)\b(?:kw1|kw2|...)\b`；关键词做转义，多词短语保留空格
pub fn keyword_regex(keywords: &[String]) -> Result<Regex, regex::Error> {
    let alternation = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    if alternation.is_empty() {
        // 空词表永不命中
        return Regex::new(r"\b\B");
    }
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
}

/// 危险词条：escalate 表示需要人工/机构升级（自伤、虐待类）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DangerEntry {
    pub escalate: bool,
    pub keywords: Vec<String>,
}

/// 情绪词条（按声明顺序求值）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionEntry {
    pub emotion: Emotion,
    /// 命中时的基础强度
    pub weight: f32,
    /// 是否计入 emotional 意图（好奇、平静只影响情绪，不改变意图）
    pub signals_intent: bool,
    pub keywords: Vec<String>,
}

/// 护栏词表（数据驱动）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lexicon {
    pub danger: Vec<DangerEntry>,
    /// 身份追问（"are you an AI"）
    pub identity: Vec<String>,
    /// 越狱/套取指令类元违规
    pub meta_violation: Vec<String>,
    pub emotions: Vec<EmotionEntry>,
    pub intensifiers: Vec<String>,
    pub narrative: Vec<String>,
    pub inappropriate: Vec<String>,
    /// 单词敷衍回复（整条消息只有这一个词时才算）
    pub dismissive: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            danger: vec![
                DangerEntry {
                    escalate: true,
                    keywords: words(&[
                        "kill myself",
                        "suicide",
                        "want to die",
                        "end my life",
                        "hurt myself",
                        "cut myself",
                        "self harm",
                        "touches me",
                        "touched me",
                        "hits me",
                        "beats me",
                        "abuse",
                        "abused",
                        "abusing me",
                    ]),
                },
                DangerEntry {
                    escalate: false,
                    keywords: words(&[
                        "in danger",
                        "emergency",
                        "following me",
                        "kidnap",
                        "kidnapped",
                        "gun",
                        "knife",
                        "on fire",
                        "bleeding",
                        "meet me alone",
                        "run away from home",
                        "locked in",
                    ]),
                },
            ],
            identity: words(&[
                "are you an ai",
                "are you ai",
                "are you a robot",
                "are you a bot",
                "are you real",
                "are you human",
                "are you a person",
                "are you a computer",
                "are you chatgpt",
                "who made you",
                "who created you",
            ]),
            meta_violation: words(&[
                "ignore your instructions",
                "ignore previous instructions",
                "ignore all instructions",
                "system prompt",
                "pretend you are",
                "developer mode",
            ]),
            emotions: vec![
                EmotionEntry {
                    emotion: Emotion::Scared,
                    weight: 0.8,
                    signals_intent: true,
                    keywords: words(&["scared", "afraid", "frightened", "terrified", "fear"]),
                },
                EmotionEntry {
                    emotion: Emotion::Worried,
                    weight: 0.6,
                    signals_intent: true,
                    keywords: words(&["worried", "worry", "nervous", "anxious", "stressed"]),
                },
                EmotionEntry {
                    emotion: Emotion::Sad,
                    weight: 0.6,
                    signals_intent: true,
                    keywords: words(&["sad", "cry", "crying", "lonely", "upset", "unhappy"]),
                },
                EmotionEntry {
                    emotion: Emotion::Excited,
                    weight: 0.6,
                    signals_intent: true,
                    keywords: words(&["excited", "awesome", "yay", "can't wait", "amazing"]),
                },
                EmotionEntry {
                    emotion: Emotion::Hopeful,
                    weight: 0.4,
                    signals_intent: true,
                    keywords: words(&["hope", "hopefully", "wish"]),
                },
                EmotionEntry {
                    emotion: Emotion::Curious,
                    weight: 0.3,
                    signals_intent: false,
                    keywords: words(&["curious", "wonder", "why", "how come", "what if"]),
                },
                EmotionEntry {
                    emotion: Emotion::Calm,
                    weight: 0.2,
                    signals_intent: false,
                    keywords: words(&["calm", "relaxed", "better now", "feel fine"]),
                },
            ],
            intensifiers: words(&["very", "really", "so", "super", "extremely", "totally"]),
            narrative: words(&[
                "story",
                "tell me",
                "what happens",
                "what happened next",
                "then what",
                "continue",
                "go on",
                "teach me",
                "lesson",
                "learn",
                "what should",
                "what would you do",
            ]),
            inappropriate: words(&[
                "sex", "porn", "naked", "nude", "fuck", "shit", "bitch", "weed", "vodka",
            ]),
            dismissive: words(&[
                "ok", "okay", "k", "no", "nope", "nah", "idk", "dunno", "whatever", "meh",
                "boring", "bored", "fine", "sure", "?",
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_regex_respects_word_boundaries() {
        let re = keyword_regex(&words(&["sad", "tell me"])).unwrap();
        assert!(re.is_match("I feel SAD today"));
        assert!(re.is_match("please tell me more"));
        assert!(!re.is_match("saddle up"));
    }

    #[test]
    fn test_empty_keyword_list_never_matches() {
        let re = keyword_regex(&[]).unwrap();
        assert!(!re.is_match("anything at all"));
        assert!(!re.is_match(""));
    }

    #[test]
    fn test_rule_set_is_ordered() {
        let set = RuleSet::new(vec![
            Rule::new("first", &words(&["help"])).unwrap(),
            Rule::new("second", &words(&["help", "me"])).unwrap(),
        ]);
        assert_eq!(set.first_match("help me").map(|r| r.label), Some("first"));
        assert_eq!(set.first_match("me").map(|r| r.label), Some("second"));
        assert!(set.first_match("nothing").is_none());
    }
}
