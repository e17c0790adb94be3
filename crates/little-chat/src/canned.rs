use std::time::Duration;

use little_chat_reply::{ErrorKind, ReplySource, ReplySourceError};
use tokio::time::sleep;

/// Default latency of [`CannedReplySource`].
pub const DEFAULT_REPLY_DELAY: Duration = Duration::from_secs(1);

const FAIL_COMMAND: &str = "/fail";

struct CannedReply {
    kind: &'static str,
    keywords: &'static [&'static str],
    content: &'static str,
}

const REPLIES: &[CannedReply] = &[
    CannedReply {
        kind: "greeting",
        keywords: &["hello", "hi", "hey", "greetings"],
        content: "Hello! I'm your AI assistant. I can answer questions, \
            look things up or help you get a task done. What can I do for \
            you?",
    },
    CannedReply {
        kind: "markdown_example",
        keywords: &["markdown", "format", "formatting"],
        content: r#"### Markdown sample

This is **bold**, this is *italic*, and this is ~~struck through~~.

#### Lists:
- First item
- Second item
  - A nested item

#### Quotes:
> Simplicity is prerequisite for reliability.

#### Inline code:
Call `greet("world")` to say hello.

#### Code block (Python):
```python
def greet(name):
    return f"Hello, {name}!"
```"#,
    },
    CannedReply {
        kind: "list_response",
        keywords: &["list", "points", "summary", "summarize"],
        content: "Here are the key points about React:

1. **Components**: an app is built from small independent components.
2. **JSX**: a syntax extension that lets you write markup in JavaScript.
3. **Virtual DOM**: the key to fast re-rendering.
4. **One-way data flow**: data flows from parents to children.
5. **Ecosystem**: plenty of libraries and tools to lean on.",
    },
    CannedReply {
        kind: "code_block_only",
        keywords: &["code", "sort", "python", "algorithm"],
        content: r#"Here is a simple sorting algorithm:

```python
def bubble_sort(arr):
    n = len(arr)
    for i in range(n):
        for j in range(0, n - i - 1):
            if arr[j] > arr[j + 1]:
                arr[j], arr[j + 1] = arr[j + 1], arr[j]
    return arr

sorted_numbers = bubble_sort([64, 34, 25, 12, 22, 11, 90])
print("Sorted:", sorted_numbers)
```"#,
    },
    CannedReply {
        kind: "link_list",
        keywords: &["link", "links", "resources", "docs"],
        content: "Here are a few useful links:

- [MDN Web Docs](https://developer.mozilla.org/)
- [React documentation](https://react.dev/)
- [Node.js](https://nodejs.org/)
- [GitHub](https://github.com/)",
    },
    CannedReply {
        kind: "long_text",
        keywords: &["long", "essay", "story", "lorem"],
        content: "This is a fairly long reply. It shows how a message \
            holds up when there is a lot of text in it.

Lorem ipsum dolor sit amet, consectetur adipiscing elit. Sed do eiusmod \
tempor incididunt ut labore et dolore magna aliqua. Ut enim ad minim veniam, \
quis nostrud exercitation ullamco laboris nisi ut aliquip ex ea commodo \
consequat. Duis aute irure dolor in reprehenderit in voluptate velit esse \
cillum dolore eu fugiat nulla pariatur.

Sed ut perspiciatis unde omnis iste natus error sit voluptatem accusantium \
doloremque laudantium, totam rem aperiam, eaque ipsa quae ab illo inventore \
veritatis et quasi architecto beatae vitae dicta sunt explicabo. Nemo enim \
ipsam voluptatem quia voluptas sit aspernatur aut odit aut fugit.",
    },
    CannedReply {
        kind: "short_acknowledgement",
        keywords: &["ok", "okay", "thanks", "thx"],
        content: "Got it.",
    },
    CannedReply {
        kind: "thinking",
        keywords: &["think", "hmm", "why"],
        content: "Let me think...",
    },
    CannedReply {
        kind: "table_example",
        keywords: &["table", "features", "compare"],
        content: "| Feature    | Description               | Supported |
|------------|---------------------------|-----------|
| Markdown   | Lightweight markup        | ✅ yes    |
| Highlight  | Syntax coloring           | ✅ yes (needs setup) |
| Tables     | Structured data           | ✅ yes    |
| Diagrams   | Needs a plugin (Mermaid)  | ❌ no     |",
    },
];

/// The error of a reply the user asked to fail.
#[derive(Debug, thiserror::Error)]
#[error("simulated provider failure")]
pub struct SimulatedFailure;

impl ReplySourceError for SimulatedFailure {
    #[inline]
    fn kind(&self) -> ErrorKind {
        ErrorKind::Unavailable
    }
}

/// A reply source answering from a fixed table, without any network.
///
/// A prompt mentioning one of the table's keywords gets that canned reply;
/// anything else is echoed back. Prompts starting with `/fail` are answered
/// with a [`SimulatedFailure`]. Every answer takes the configured delay.
#[derive(Clone, Debug)]
pub struct CannedReplySource {
    delay: Duration,
}

impl CannedReplySource {
    /// Creates a source with the default one second delay.
    #[inline]
    pub fn new() -> Self {
        Self::with_delay(DEFAULT_REPLY_DELAY)
    }

    /// Creates a source that answers after `delay`.
    #[inline]
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }

    /// Returns the answer for `prompt` without waiting.
    pub fn answer(prompt: &str) -> Result<String, SimulatedFailure> {
        let prompt = prompt.trim();
        if prompt.starts_with(FAIL_COMMAND) {
            return Err(SimulatedFailure);
        }
        match select(prompt) {
            Some(reply) => {
                trace!("canned reply: {}", reply.kind);
                Ok(reply.content.to_owned())
            }
            None => Ok(format!("This is the AI reply:\n{prompt}...")),
        }
    }
}

impl Default for CannedReplySource {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl ReplySource for CannedReplySource {
    type Error = SimulatedFailure;

    fn get_reply(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'static
    {
        let answer = Self::answer(prompt);
        let delay = self.delay;
        async move {
            sleep(delay).await;
            answer
        }
    }
}

fn select(prompt: &str) -> Option<&'static CannedReply> {
    let words: Vec<String> = prompt
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect();
    REPLIES.iter().find(|reply| {
        reply
            .keywords
            .iter()
            .any(|keyword| words.iter().any(|word| word == keyword))
    })
}
