use super::split_text as split_text_impl;
use super::*;
use crate::catalog::ToolDetail;

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn prefix(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

fn suffix(text: &str, n: usize) -> String {
    let len = char_len(text);
    text.chars().skip(len.saturating_sub(n)).collect()
}

fn assert_overlap(windows: &[String], chunk_size: usize, overlap: usize) {
    for window in windows {
        assert!(char_len(window) <= chunk_size, "window too long: {}", char_len(window));
    }
    for pair in windows.windows(2) {
        assert_eq!(suffix(&pair[0], overlap), prefix(&pair[1], overlap));
    }
}

fn reassemble(windows: &[String], overlap: usize) -> String {
    let mut text = String::new();
    for (i, window) in windows.iter().enumerate() {
        let skip = if i == 0 { 0 } else { overlap };
        text.extend(window.chars().skip(skip));
    }
    text
}

fn record(id: &str, description: &str) -> ToolRecord {
    let detail = ToolDetail {
        name: Some(format!("Tool {id}")),
        description: Some(description.to_string()),
        ..ToolDetail::default()
    };
    ToolRecord::from_detail(id, detail, &format!("https://bio.tools/api/t/{id}?format=json"))
        .expect("record should build")
}

#[test]
fn hard_cut_scenario() {
    let text = "x".repeat(2500);
    let windows = split_text_impl(&text, 1000, 100).expect("split should succeed");

    let lengths: Vec<usize> = windows.iter().map(|w| char_len(w)).collect();
    assert_eq!(lengths, vec![1000, 1000, 700]);
    assert_overlap(&windows, 1000, 100);
    assert_eq!(reassemble(&windows, 100), text);
}

#[test]
fn splitting_is_deterministic() {
    let text = "Aligns reads to a reference genome. Supports paired-end data!\n\n".repeat(60);

    let first = split_text_impl(&text, 300, 40).expect("split should succeed");
    let second = split_text_impl(&text, 300, 40).expect("split should succeed");

    assert_eq!(first, second);
}

#[test]
fn natural_text_keeps_exact_overlap() {
    let text = "Tool Name: Bowtie\nDescription: An ultrafast, memory-efficient short read aligner. \
                It aligns short DNA sequences to the human genome.\n"
        .repeat(40);

    let windows = split_text_impl(&text, 250, 30).expect("split should succeed");

    assert!(windows.len() > 1);
    assert_overlap(&windows, 250, 30);
    assert_eq!(reassemble(&windows, 30), text);
}

#[test]
fn prefers_paragraph_break() {
    let text = format!("{}\n\n{}", "a".repeat(600), "b".repeat(600));
    let windows = split_text_impl(&text, 1000, 100).expect("split should succeed");

    assert_eq!(windows.len(), 2);
    assert_eq!(char_len(&windows[0]), 602);
    assert!(windows[0].ends_with("\n\n"));
    assert_eq!(char_len(&windows[1]), 700);
    assert_overlap(&windows, 1000, 100);
}

#[test]
fn prefers_sentence_over_word_break() {
    let text = format!("{}. {} {}", "a".repeat(60), "b".repeat(20), "c".repeat(40));
    let windows = split_text_impl(&text, 100, 10).expect("split should succeed");

    assert!(windows[0].ends_with(". "));
    assert_eq!(char_len(&windows[0]), 62);
    assert_overlap(&windows, 100, 10);
}

#[test]
fn falls_back_to_word_break() {
    let text = format!("{} {} {}", "a".repeat(50), "b".repeat(30), "c".repeat(50));
    let windows = split_text_impl(&text, 100, 10).expect("split should succeed");

    assert!(windows[0].ends_with(' '));
    assert_eq!(char_len(&windows[0]), 82);
    assert_overlap(&windows, 100, 10);
}

#[test]
fn early_breakpoints_are_ignored() {
    // A break in the first half of the window would produce a tiny chunk
    let text = format!("ab\n\n{}", "z".repeat(300));
    let windows = split_text_impl(&text, 100, 10).expect("split should succeed");

    assert_eq!(char_len(&windows[0]), 100);
}

#[test]
fn short_and_empty_text() {
    assert_eq!(
        split_text_impl("short text", 1000, 100).expect("split should succeed"),
        vec!["short text".to_string()]
    );
    assert!(split_text_impl("", 1000, 100)
        .expect("split should succeed")
        .is_empty());

    let exact = "y".repeat(1000);
    assert_eq!(
        split_text_impl(&exact, 1000, 100)
            .expect("split should succeed")
            .len(),
        1
    );
}

#[test]
fn counts_characters_not_bytes() {
    let text = "é".repeat(250);
    let windows = split_text_impl(&text, 100, 10).expect("split should succeed");

    assert_eq!(windows.len(), 3);
    assert_eq!(char_len(&windows[0]), 100);
    assert_overlap(&windows, 100, 10);
    assert_eq!(reassemble(&windows, 10), text);
}

#[test]
fn zero_overlap() {
    let text = "q".repeat(250);
    let windows = split_text_impl(&text, 100, 0).expect("split should succeed");
    assert_eq!(windows.concat(), text);
}

#[test]
fn invalid_parameters_are_rejected() {
    assert!(matches!(
        split_text_impl("text", 0, 0),
        Err(ToolsyError::Config(_))
    ));
    assert!(matches!(
        split_text_impl("text", 100, 100),
        Err(ToolsyError::Config(_))
    ));
}

#[test]
fn catalog_order_and_back_references() {
    let catalog = Catalog::from_records(vec![
        record("long", &"Long description sentence. ".repeat(80)),
        record("short", "Brief."),
    ])
    .expect("catalog should build");

    let chunks = chunk_catalog(&catalog, &ChunkingConfig::default()).expect("chunking should work");

    assert!(chunks.len() >= 3);
    let last = chunks.last().expect("has chunks");
    assert_eq!(last.tool_id, "short");
    assert_eq!(last.chunk_index, 0);
    assert_eq!(last.id(), "short#0");

    let long_chunks: Vec<&Chunk> = chunks.iter().filter(|c| c.tool_id == "long").collect();
    for (i, chunk) in long_chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i);
        assert_eq!(chunk.name, "Tool long");
        assert_eq!(chunk.source, "https://bio.tools/api/t/long?format=json");
    }
    assert!(chunks.iter().take(long_chunks.len()).all(|c| c.tool_id == "long"));
}
