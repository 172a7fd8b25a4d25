use super::*;
use crate::article::Article;

fn article_with_body(body: &str) -> Article {
    let mut article = Article::new("https://a.example/1", "Title", body).expect("valid article");
    article.body = body.to_string();
    article
}

#[test]
fn empty_body_yields_zero_chunks() {
    let config = ChunkingConfig::default();
    assert!(split_text("", &config).is_empty());
    assert!(split_text("   \n\n  ", &config).is_empty());
}

#[test]
fn short_text_yields_one_chunk() {
    let config = ChunkingConfig::default();
    let chunks = split_text("Short text.", &config);
    assert_eq!(chunks, vec!["Short text.".to_string()]);
}

#[test]
fn splitting_is_idempotent() {
    let config = ChunkingConfig {
        max_chunk_size: 80,
        overlap: 20,
    };
    let body = "First paragraph about models.\n\nSecond paragraph about funding rounds. \
                It has two sentences.\n\nThird paragraph closes the article with more detail."
        .repeat(3);

    let first = split_text(&body, &config);
    let second = split_text(&body, &config);
    assert_eq!(first, second);
    assert!(first.len() > 1);
}

#[test]
fn chunk_indexes_are_stable_and_ordered() {
    let config = ChunkingConfig {
        max_chunk_size: 40,
        overlap: 10,
    };
    let article = article_with_body(
        "Alpha paragraph one here.\n\nBeta paragraph two here.\n\nGamma paragraph three here.",
    );

    let chunks = split_article(&article, &config);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.index as usize, i);
        assert_eq!(chunk.article_fingerprint, article.fingerprint);
    }
}

#[test]
fn adjacent_chunks_overlap() {
    let config = ChunkingConfig {
        max_chunk_size: 60,
        overlap: 15,
    };
    let body = "One two three four five six seven.\n\nEight nine ten eleven twelve thirteen.\n\n\
                Fourteen fifteen sixteen seventeen eighteen.";

    let with_overlap = split_text(body, &config);
    let without_overlap = split_text(
        body,
        &ChunkingConfig {
            max_chunk_size: 60,
            overlap: 0,
        },
    );
    assert!(with_overlap.len() > 1);
    assert_eq!(with_overlap.len(), without_overlap.len());

    for i in 1..with_overlap.len() {
        let tail: String = {
            let prev = &without_overlap[i - 1];
            let count = prev.chars().count();
            prev.chars().skip(count.saturating_sub(15)).collect()
        };
        assert!(
            with_overlap[i].starts_with(&tail),
            "chunk {i} should start with the previous chunk's tail"
        );
    }
}

#[test]
fn oversized_sentence_is_hard_split() {
    let config = ChunkingConfig {
        max_chunk_size: 20,
        overlap: 0,
    };
    let body = "a".repeat(65);

    let chunks = split_text(&body, &config);
    assert_eq!(chunks.len(), 4);
    for chunk in &chunks {
        assert!(chunk.chars().count() <= 20);
    }
}

#[test]
fn chunks_respect_size_budget_without_overlap() {
    let config = ChunkingConfig {
        max_chunk_size: 50,
        overlap: 0,
    };
    let body = "A sentence here. Another sentence there. More words follow. And even more. \
                Final thoughts wrap it up nicely for everyone.";

    for chunk in split_text(body, &config) {
        assert!(
            chunk.chars().count() <= 50,
            "chunk exceeded budget: {chunk:?}"
        );
    }
}

#[test]
fn unicode_bodies_split_on_char_boundaries() {
    let config = ChunkingConfig {
        max_chunk_size: 10,
        overlap: 3,
    };
    let body = "héllo wörld ünïcode tèxt goes ön and ön";

    // Must not panic on multi-byte boundaries.
    let chunks = split_text(body, &config);
    assert!(!chunks.is_empty());
}
