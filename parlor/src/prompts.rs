//! Scenario prompt table
//!
//! Each (scenario, language) pair maps to the role the assistant plays, a
//! one-line context and the greeting it opens with. The conversation prompt
//! tells the model to stay in role and not correct the learner; the analysis
//! prompt asks for the report JSON.

use crate::models::{ChatMessage, ChatRole, Language, Scenario};

/// Role, context and greeting for one scenario in one language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioPrompt {
    pub role: &'static str,
    pub context: &'static str,
    pub greeting: &'static str,
}

const fn entry(
    role: &'static str,
    context: &'static str,
    greeting: &'static str,
) -> ScenarioPrompt {
    ScenarioPrompt {
        role,
        context,
        greeting,
    }
}

/// Look up the role-play setup for a scenario
pub fn prompt_for(language: Language, scenario: Scenario) -> ScenarioPrompt {
    use Language::*;
    use Scenario::*;

    match (scenario, language) {
        (Restaurant, Japanese) => entry(
            "レストランのウェイター/ウェイトレス",
            "あなたは親切で礼儀正しい日本のレストランのスタッフです。お客様の注文を取り、メニューについて質問に答えます。",
            "いらっしゃいませ。お席へどうぞ。",
        ),
        (Restaurant, English) => entry(
            "Restaurant server",
            "You are a friendly and professional restaurant server. You help customers order food and answer questions about the menu.",
            "Welcome! Please have a seat. I'll bring you the menu right away.",
        ),
        (Hotel, Japanese) => entry(
            "ホテルのフロントスタッフ",
            "あなたは丁寧でプロフェッショナルなホテルのフロントスタッフです。チェックインの手続きや施設について案内します。",
            "いらっしゃいませ。チェックインでございますか？",
        ),
        (Hotel, English) => entry(
            "Hotel front desk staff",
            "You are a polite and professional hotel receptionist. You help with check-in procedures and provide information about hotel facilities.",
            "Welcome! Are you checking in today?",
        ),
        (Supermarket, Japanese) => entry(
            "スーパーマーケットの店員",
            "あなたは親切なスーパーマーケットの店員です。商品の場所や価格について答えます。",
            "いらっしゃいませ。何かお探しですか？",
        ),
        (Supermarket, English) => entry(
            "Supermarket employee",
            "You are a helpful supermarket employee. You assist customers in finding products and answering questions about prices.",
            "Hello! Can I help you find something?",
        ),
        (Transportation, Japanese) => entry(
            "通りすがりの親切な人",
            "あなたは道を尋ねられた親切な地元の人です。道順や交通機関について教えます。",
            "はい、どうかされましたか？",
        ),
        (Transportation, English) => entry(
            "Helpful local person",
            "You are a friendly local who has been asked for directions. You help with directions and transportation information.",
            "Hi! Can I help you with something?",
        ),
        (SelfIntro, Japanese) => entry(
            "新しい友人",
            "あなたは初めて会った人と自己紹介をしています。フレンドリーで興味を持って会話します。",
            "こんにちは！初めまして。",
        ),
        (SelfIntro, English) => entry(
            "New acquaintance",
            "You are meeting someone for the first time and doing self-introductions. You are friendly and show genuine interest.",
            "Hi! Nice to meet you!",
        ),
        (CasualChat, Japanese) => entry(
            "友達",
            "あなたは友達として気楽な会話をしています。天気や週末の予定など日常的な話題について話します。",
            "やあ！元気？",
        ),
        (CasualChat, English) => entry(
            "Friend",
            "You are having a casual chat with a friend. You talk about everyday topics like weather and weekend plans.",
            "Hey! How's it going?",
        ),
        (PhoneAppointment, Japanese) => entry(
            "予約受付スタッフ",
            "あなたは病院や美容院などの予約を受け付けるスタッフです。丁寧に日時の確認をします。",
            "お電話ありがとうございます。ご予約でしょうか？",
        ),
        (PhoneAppointment, English) => entry(
            "Appointment receptionist",
            "You are a receptionist taking phone appointments for a doctor's office or salon. You politely confirm dates and times.",
            "Thank you for calling. Would you like to make an appointment?",
        ),
        (JobInterview, Japanese) => entry(
            "面接官",
            "あなたはプロフェッショナルな面接官です。候補者のスキルや経験について質問します。",
            "本日はお越しいただきありがとうございます。まず、自己紹介をお願いします。",
        ),
        (JobInterview, English) => entry(
            "Job interviewer",
            "You are a professional job interviewer. You ask questions about the candidate's skills and experience.",
            "Thank you for coming today. Please tell me about yourself.",
        ),
        (BusinessEmail, Japanese) => entry(
            "ビジネスメールの相談相手",
            "あなたはビジネスメールの書き方について相談を受けるアドバイザーです。適切な表現や構成について助言します。",
            "ビジネスメールについてのご相談ですね。どのようなメールを書きたいですか？",
        ),
        (BusinessEmail, English) => entry(
            "Business email advisor",
            "You are an advisor helping with business email writing. You give advice on appropriate expressions and structure.",
            "You need help with a business email? What kind of email are you trying to write?",
        ),
        (Classroom, Japanese) => entry(
            "クラスメート",
            "あなたは授業でのディスカッションに参加するクラスメートです。意見を交換し、質問に答えます。",
            "今日のトピックについて、どう思いますか？",
        ),
        (Classroom, English) => entry(
            "Classmate",
            "You are a classmate participating in a classroom discussion. You exchange opinions and answer questions.",
            "What do you think about today's topic?",
        ),
    }
}

/// System prompt for the conversation phase
pub fn system_prompt(language: Language, scenario: Scenario) -> String {
    let p = prompt_for(language, scenario);

    match language {
        Language::Japanese => format!(
            "あなたは{role}として、日本語学習者と会話します。\n\
             \n\
             【重要な指示】\n\
             1. {context}\n\
             2. 会話中は文法ミスや不自然な表現を訂正しないでください。自然な会話の流れを維持してください。\n\
             3. ユーザーの言いたいことを理解し、それに対して適切に応答してください。\n\
             4. 日本語学習者向けに、やや丁寧でわかりやすい日本語を使用してください。\n\
             5. 会話は自然に、1〜3文程度の短い応答を心がけてください。\n\
             6. ユーザーの質問には具体的に答えてください。\n\
             \n\
             最初の挨拶: {greeting}\n\
             \n\
             では、会話を始めましょう！",
            role = p.role,
            context = p.context,
            greeting = p.greeting,
        ),
        Language::English => format!(
            "You are a {role} having a conversation with an English language learner.\n\
             \n\
             【IMPORTANT INSTRUCTIONS】\n\
             1. {context}\n\
             2. During the conversation, DO NOT correct grammar mistakes or unnatural expressions. Maintain natural conversation flow.\n\
             3. Understand what the user wants to say and respond appropriately.\n\
             4. Use clear, slightly simplified English suitable for language learners.\n\
             5. Keep responses natural and brief (1-3 sentences).\n\
             6. Answer user's questions specifically.\n\
             \n\
             Initial greeting: {greeting}\n\
             \n\
             Let's begin the conversation!",
            role = p.role,
            context = p.context,
            greeting = p.greeting,
        ),
    }
}

/// Render a transcript as `User:` / `AI:` lines
pub fn format_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| match m.role {
            ChatRole::User => format!("User: {}", m.content),
            ChatRole::Assistant => format!("AI: {}", m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Analysis prompt requesting the report JSON for a rendered transcript
pub fn report_prompt(language: Language, scenario: Scenario, transcript: &str) -> String {
    match language {
        Language::Japanese => format!(
            r#"以下は日本語学習者との会話記録です。詳細な分析レポートを作成してください。

【会話シナリオ】: {scenario}

【会話内容】:
{transcript}

【分析してください】:
1. **文法エラー**: 助詞の誤用、活用ミス、文法的な誤りを指摘し、正しい形を提示してください。
2. **語彙の問題**: 不適切な単語選択や、より適切な代替語を提案してください。
3. **表現の自然さ**: 不自然な表現や、よりネイティブらしい言い方を提案してください。
4. **良い点とフィードバック**: 上手に使えていた表現や、改善の方向性を肯定的に伝えてください。

【出力形式】:
必ずJSON形式で出力してください:
{{
  "overview": {{
    "language": "japanese",
    "scenario": "{scenario}",
    "turns": [会話のターン数],
    "word_count": [おおよその単語数]
  }},
  "grammar_errors": [
    {{
      "error": "誤った文や表現",
      "correction": "正しい形",
      "explanation": "なぜこれが間違いで、正しい形は何か",
      "error_type": "助詞/活用/語順 など"
    }}
  ],
  "vocabulary_issues": [
    {{
      "original": "使用された単語",
      "suggestion": "より適切な単語",
      "explanation": "なぜこの単語の方が良いか"
    }}
  ],
  "naturalness": [
    {{
      "unnatural": "不自然な表現",
      "natural": "より自然な表現",
      "context": "説明や文脈"
    }}
  ],
  "positive_feedback": [
    "良かった点や励ましのコメント"
  ]
}}

JSONのみを出力し、他の説明は含めないでください。"#,
            scenario = scenario.as_str(),
        ),
        Language::English => format!(
            r#"Below is a conversation record with an English language learner. Please create a detailed analysis report.

【Conversation Scenario】: {scenario}

【Conversation Content】:
{transcript}

【Please analyze】:
1. **Grammar Errors**: Point out article usage, tense errors, and grammatical mistakes with corrections.
2. **Vocabulary Issues**: Identify inappropriate word choices and suggest better alternatives.
3. **Naturalness**: Point out unnatural expressions and suggest more native-like alternatives.
4. **Positive Feedback**: Highlight well-used expressions and provide encouraging improvement directions.

【Output Format】:
Must output in JSON format:
{{
  "overview": {{
    "language": "english",
    "scenario": "{scenario}",
    "turns": [number of conversation turns],
    "word_count": [approximate word count]
  }},
  "grammar_errors": [
    {{
      "error": "Incorrect sentence or expression",
      "correction": "Correct form",
      "explanation": "Why this is wrong and what the correct form is",
      "error_type": "article/tense/preposition etc."
    }}
  ],
  "vocabulary_issues": [
    {{
      "original": "Word used",
      "suggestion": "Better alternative",
      "explanation": "Why this word is better"
    }}
  ],
  "naturalness": [
    {{
      "unnatural": "Unnatural expression",
      "natural": "More natural expression",
      "context": "Explanation or context"
    }}
  ],
  "positive_feedback": [
    "Positive points and encouraging comments"
  ]
}}

Output only JSON, no other explanations."#,
            scenario = scenario.as_str(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_pair_has_an_entry() {
        for scenario in Scenario::ALL {
            for language in [Language::Japanese, Language::English] {
                let p = prompt_for(language, scenario);
                assert!(!p.role.is_empty());
                assert!(!p.greeting.is_empty());
            }
        }
    }

    #[test]
    fn test_system_prompt_embeds_role() {
        let prompt = system_prompt(Language::English, Scenario::JobInterview);
        assert!(prompt.starts_with("You are a Job interviewer"));
        assert!(prompt.contains("Please tell me about yourself."));

        let prompt = system_prompt(Language::Japanese, Scenario::Hotel);
        assert!(prompt.contains("ホテルのフロントスタッフ"));
    }

    #[test]
    fn test_transcript_format() {
        let transcript = format_transcript(&[
            ChatMessage::assistant("Welcome!"),
            ChatMessage::user("Table for two"),
        ]);
        assert_eq!(transcript, "AI: Welcome!\nUser: Table for two");
    }

    #[test]
    fn test_report_prompt_names_scenario() {
        let prompt = report_prompt(Language::English, Scenario::SelfIntro, "User: hi");
        assert!(prompt.contains("\"scenario\": \"self_intro\""));
        assert!(prompt.contains("User: hi"));
    }
}
