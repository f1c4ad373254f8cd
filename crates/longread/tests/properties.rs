//! Property tests for chunking, windowing and assembly.

use longread::context::window::paragraphs;
use longread::context::{ChunkSplitter, MarkerRules, SummaryAssembler, TextMeasure, WindowManager};
use proptest::prelude::*;

/// Plain prose: lowercase words of at most 10 letters, sentences ending in a
/// period, paragraphs separated by blank lines.
fn prose() -> impl Strategy<Value = String> {
    let sentence = prop::collection::vec("[a-z]{1,10}", 1..12).prop_map(|w| w.join(" ") + ".");
    let paragraph = prop::collection::vec(sentence, 1..6).prop_map(|s| s.join(" "));
    prop::collection::vec(paragraph, 1..12).prop_map(|p| p.join("\n\n"))
}

proptest! {
    #[test]
    fn chunks_reassemble_the_input(text in prose(), max in 12usize..400) {
        let splitter = ChunkSplitter::new(max, TextMeasure::Chars);
        let joined: String = splitter.split(&text).map(|c| c.text).collect();
        prop_assert_eq!(joined, text);
    }

    #[test]
    fn chunks_respect_the_limit(text in prose(), max in 12usize..400) {
        // Every word fits, so no chunk may exceed the limit.
        let splitter = ChunkSplitter::new(max, TextMeasure::Chars);
        for (i, chunk) in splitter.split(&text).enumerate() {
            prop_assert_eq!(chunk.index, i);
            prop_assert!(!chunk.content().is_empty());
            prop_assert!(chunk.content().chars().count() <= max, "{:?}", chunk.content());
        }
    }

    #[test]
    fn chunk_offsets_are_contiguous(text in prose(), max in 12usize..400) {
        let splitter = ChunkSplitter::new(max, TextMeasure::Chars);
        let mut pos = 0;
        for chunk in splitter.split(&text) {
            prop_assert_eq!(chunk.start, pos);
            prop_assert_eq!(&text[chunk.start..chunk.end()], chunk.text);
            pos = chunk.end();
        }
        prop_assert_eq!(pos, text.len());
    }

    #[test]
    fn windows_fit_and_keep_the_chunk_whole(
        text in prose(),
        prior in prose(),
        max_chunk in 20usize..300,
        tail_budget in 0usize..200,
        context in 1usize..4,
    ) {
        let max_window = max_chunk + tail_budget;
        let splitter = ChunkSplitter::new(max_chunk, TextMeasure::Chars);
        let windows = WindowManager::new(max_window, tail_budget, context, TextMeasure::Chars);

        for chunk in splitter.split(&text) {
            let window = windows.next_window(&prior, &chunk);
            prop_assert_eq!(window.chunk, chunk.content());
            prop_assert!(window.chars() <= max_window);
            prop_assert!(window.tail.chars() <= tail_budget);
            prop_assert!(window.tail.whole_paragraphs <= context);
        }
    }

    #[test]
    fn whole_paragraph_tails_come_from_the_end(prior in prose(), context in 1usize..4) {
        let windows = WindowManager::new(100_000, 50_000, context, TextMeasure::Chars);
        let splitter = ChunkSplitter::new(1_000, TextMeasure::Chars);
        let chunk = splitter.split("Next part.").next().unwrap();

        let window = windows.next_window(&prior, &chunk);
        let all = paragraphs(&prior);
        let expected = all[all.len().saturating_sub(context)..].join("\n\n");
        prop_assert_eq!(window.tail.text, expected);
    }

    #[test]
    fn finalize_is_stable(responses in prop::collection::vec(prose(), 1..5), hold in 0usize..4) {
        let mut assembler = SummaryAssembler::new(MarkerRules::default(), hold);
        for response in &responses {
            assembler.carry(0);
            assembler.append(response);
        }
        let first = assembler.finalize();
        prop_assert_eq!(assembler.finalize(), first.clone());
        prop_assert!(first.ends_with('\n'));
        prop_assert!(!first.ends_with("\n\n"));

        // Feeding the finished summary back through a fresh assembler
        // changes nothing.
        let mut again = SummaryAssembler::new(MarkerRules::default(), hold);
        again.append(&first);
        prop_assert_eq!(again.finalize(), first);
    }
}
