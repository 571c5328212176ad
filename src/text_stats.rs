use crate::models::StatisticalMetrics;
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;
use vader_sentiment::SentimentIntensityAnalyzer;

/// Deterministic statistics over a piece of text
///
/// Every operation is recomputed from the borrowed text on each call, so the
/// calculator can be shared freely and never goes stale.
pub struct TextMetrics<'a> {
    text: &'a str,
}

impl<'a> TextMetrics<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text }
    }

    /// Sentences found by Unicode sentence segmentation
    fn sentences(&self) -> Vec<&'a str> {
        self.text
            .unicode_sentences()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Word-bound tokens of a text, punctuation included, whitespace excluded
    fn tokens(text: &str) -> Vec<&str> {
        text.split_word_bounds()
            .filter(|token| !token.trim().is_empty())
            .collect()
    }

    pub fn sentence_count(&self) -> usize {
        self.sentences().len()
    }

    pub fn word_count(&self) -> usize {
        Self::tokens(self.text).len()
    }

    /// Number of non-blank blocks separated by an empty line
    pub fn paragraph_count(&self) -> usize {
        self.text
            .split("\n\n")
            .filter(|paragraph| !paragraph.trim().is_empty())
            .count()
    }

    /// Mean number of tokens per sentence, 0.0 when there is no sentence
    pub fn avg_words_per_sentence(&self) -> f64 {
        let sentences = self.sentences();
        if sentences.is_empty() {
            return 0.0;
        }

        let total: usize = sentences.iter().map(|s| Self::tokens(s).len()).sum();
        total as f64 / sentences.len() as f64
    }

    pub fn lexical_diversity(&self) -> f64 {
        let tokens = Self::tokens(self.text);
        if tokens.is_empty() {
            return 0.0;
        }

        let unique: HashSet<&str> = tokens.iter().copied().collect();
        unique.len() as f64 / tokens.len() as f64
    }

    pub fn content_length(&self) -> usize {
        self.text.chars().count()
    }

    /// VADER compound polarity rescaled from [-1, 1] to [0, 1]
    pub fn sentiment_score(&self) -> f64 {
        let analyzer = SentimentIntensityAnalyzer::new();
        let scores = analyzer.polarity_scores(self.text);
        let compound = scores.get("compound").copied().unwrap_or(0.0);

        ((compound + 1.0) / 2.0).clamp(0.0, 1.0)
    }

    /// Flesch reading ease. Unbounded: very dense text goes negative, very
    /// simple text goes above 100.
    pub fn reading_ease(&self) -> f64 {
        let words: Vec<&str> = self.text.unicode_words().collect();
        if words.is_empty() {
            return 0.0;
        }

        let sentences = self.sentence_count().max(1) as f64;
        let syllables: usize = words.iter().map(|w| count_syllables(w)).sum();
        let word_total = words.len() as f64;

        206.835 - 1.015 * (word_total / sentences) - 84.6 * (syllables as f64 / word_total)
    }

    /// Keyword density in percent
    ///
    /// `density = KR / (TW - KR * (NWK - 1)) * 100` where KR is the number of
    /// case-insensitive occurrences of the phrase, NWK the number of words in
    /// the phrase and TW the number of whitespace separated words in the text.
    pub fn keyword_density(&self, keyword: &str) -> f64 {
        let keyword = keyword.to_lowercase();
        let phrase_words = keyword.split_whitespace().count();
        if phrase_words == 0 {
            return 0.0;
        }

        let text = self.text.to_lowercase();
        let occurrences = text.matches(keyword.as_str()).count();
        let total_words = text.split_whitespace().count();

        density(occurrences, phrase_words, total_words)
    }

    /// Every default statistic in one pass over the accessors
    pub fn summary(&self) -> StatisticalMetrics {
        StatisticalMetrics {
            sentiment: self.sentiment_score(),
            reading_ease: self.reading_ease(),
            word_count: self.word_count(),
            paragraph_count: self.paragraph_count(),
            sentence_count: self.sentence_count(),
            words_per_sentence: self.avg_words_per_sentence(),
            lexical_diversity: self.lexical_diversity(),
            content_length: self.content_length(),
        }
    }
}

/// Density formula with its degenerate cases pinned down: no occurrence is
/// 0%, and a phrase that covers every word of the text saturates at 100%.
fn density(occurrences: usize, phrase_words: usize, total_words: usize) -> f64 {
    if occurrences == 0 {
        return 0.0;
    }

    let denominator = total_words as f64 - (occurrences * (phrase_words - 1)) as f64;
    if denominator <= 0.0 {
        return 100.0;
    }

    occurrences as f64 / denominator * 100.0
}

/// Vowel-group syllable estimate, dropping a silent trailing 'e'
fn count_syllables(word: &str) -> usize {
    let letters: Vec<char> = word
        .chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect();
    if letters.is_empty() {
        return 1;
    }

    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut count = 0;
    let mut previous_vowel = false;
    for &letter in &letters {
        let vowel = is_vowel(letter);
        if vowel && !previous_vowel {
            count += 1;
        }
        previous_vowel = vowel;
    }

    let len = letters.len();
    if count > 1 && len > 2 && letters[len - 1] == 'e' {
        let before = letters[len - 2];
        if !is_vowel(before) && before != 'l' {
            count -= 1;
        }
    }

    count.max(1)
}
