//! Default config file content written on first run.

/// Generate the default TOML config content with comments.
pub(super) fn default_config_toml() -> String {
    r##"# parley configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[server]
# bind = "0.0.0.0"
# port = 8787
# hello_timeout_secs = 10     # 1-120
# room_idle_ttl_secs = 300
# reaper_interval_secs = 60

[rooms]
# max_participants = 8        # 1-64
# config_api_url = ""         # base URL serving GET /api/rooms/:id
# config_api_timeout_secs = 5 # 1-60
# default_personality = "facilitator"   # facilitator, expert, brainstorm, critic, custom
# idle_after_secs = 60

[ai]
# realtime_url = "wss://api.openai.com/v1/realtime"
# model = "gpt-4o-realtime-preview"
# api_key_env = "OPENAI_API_KEY"
# voice = "alloy"
# connect_timeout_secs = 10
# min_transcript_chars = 5
# context_token_budget = 2000
# sample_rate = 24000

[context]
# max_messages = 200
# max_tokens_before_summary = 8000
# target_tokens_after_summary = 2000
# chars_per_token = 4

[summarization]
# enabled = true
# entry_threshold = 50
# interval_secs = 600
# check_interval_secs = 30
# llm_url = "https://api.openai.com/v1/chat/completions"
# llm_model = "gpt-4o-mini"
# api_key_env = "OPENAI_API_KEY"
# request_timeout_secs = 30

[broadcast]
# buffer_threshold_ms = 200
# max_buffer_wait_ms = 500
# sync_offset_ms = 150
# max_buffer_chunks = 1024
# min_ready_fraction = 0.5

[reconnection]
# max_attempts = 5
# base_delay_ms = 1000
# max_delay_ms = 30000
# exponential = true
# jitter = 0.3

[logging]
# level = "parley_relay=info,parley_social=info,parley_ai=info"
"##
    .to_string()
}
