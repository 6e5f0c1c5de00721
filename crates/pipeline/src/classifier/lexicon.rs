//! Keyword lexicons and the term matcher they share.
//!
//! Terms match on word boundaries so "ram" does not fire inside
//! "program". Boundaries are Unicode-aware, which matters for Vietnamese.

use rigchat_core::intent::Intent;

/// Count non-overlapping occurrences of `term` in `haystack` that are not
/// glued to a neighbouring letter or digit. Both sides must be lowercase.
pub fn count_term(haystack: &str, term: &str) -> usize {
    if term.is_empty() {
        return 0;
    }
    let mut count = 0;
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(term) {
        let start = from + pos;
        let end = start + term.len();
        let before_ok = haystack[..start].chars().next_back().is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..].chars().next().is_none_or(|c| !c.is_alphanumeric());
        if before_ok && after_ok {
            count += 1;
            from = end;
        } else {
            // Advance one char past the false hit
            from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
        }
    }
    count
}

pub fn contains_term(haystack: &str, term: &str) -> bool {
    count_term(haystack, term) > 0
}

/// Labels from `lexicon` whose terms occur in `text`, in lexicon order.
pub fn labels_in(text: &str, lexicon: &[(&'static str, &[&str])]) -> Vec<String> {
    lexicon
        .iter()
        .filter(|(_, terms)| terms.iter().any(|t| contains_term(text, t)))
        .map(|(label, _)| (*label).to_string())
        .collect()
}

/// Intent lexicons in declaration order. Ties go to the earlier entry.
pub const INTENTS: &[(Intent, &[&str])] = &[
    (
        Intent::BuildHelp,
        &[
            "build", "lắp ráp", "lắp máy", "ráp máy", "cấu hình", "dựng máy", "setup", "assemble",
            "tư vấn cấu hình", "nâng cấp", "upgrade",
        ],
    ),
    (
        Intent::ProductInquiry,
        &[
            "giá", "bao nhiêu tiền", "mua", "sản phẩm", "price", "còn hàng", "so sánh", "compare",
            "thông số", "khuyến mãi", "bảo nhiêu",
        ],
    ),
    (
        Intent::Support,
        &[
            "lỗi", "hỏng", "không lên", "sửa", "hỗ trợ", "error", "bảo hành", "không hoạt động", "fix",
            "crash", "treo", "màn hình xanh", "bsod",
        ],
    ),
    (
        Intent::General,
        &["xin chào", "chào", "hello", "cảm ơn", "thanks", "thank you"],
    ),
];

pub const PURPOSES: &[(&str, &[&str])] = &[
    ("gaming", &["gaming", "game", "chơi game", "esport", "esports"]),
    ("office", &["văn phòng", "office", "làm việc", "học tập", "học online"]),
    ("design", &["đồ họa", "thiết kế", "design", "photoshop", "render", "3d"]),
    ("streaming", &["stream", "streaming", "livestream"]),
    ("programming", &["lập trình", "code", "coding", "programming", "developer"]),
    ("video_editing", &["dựng phim", "edit video", "video editing", "chỉnh sửa video", "premiere"]),
];

pub const COMPONENTS: &[(&str, &[&str])] = &[
    ("cpu", &["cpu", "vi xử lý", "processor", "ryzen", "i3", "i5", "i7", "i9"]),
    ("gpu", &["gpu", "vga", "card đồ họa", "card màn hình", "rtx", "gtx", "radeon"]),
    ("ram", &["ram", "ddr4", "ddr5", "bộ nhớ trong"]),
    ("storage", &["ssd", "hdd", "ổ cứng", "nvme", "storage"]),
    ("mainboard", &["mainboard", "bo mạch chủ", "motherboard", "mobo"]),
    ("psu", &["psu", "nguồn", "power supply"]),
    ("case", &["case", "vỏ máy", "thùng máy"]),
    ("cooling", &["tản nhiệt", "cooling", "quạt", "fan", "aio"]),
    ("monitor", &["monitor", "màn hình"]),
];

pub const BRANDS: &[(&str, &[&str])] = &[
    ("intel", &["intel"]),
    ("amd", &["amd"]),
    ("nvidia", &["nvidia"]),
    ("asus", &["asus", "rog"]),
    ("msi", &["msi"]),
    ("gigabyte", &["gigabyte", "aorus"]),
    ("asrock", &["asrock"]),
    ("corsair", &["corsair"]),
    ("kingston", &["kingston"]),
    ("samsung", &["samsung"]),
    ("western digital", &["western digital", "wd"]),
    ("seagate", &["seagate"]),
    ("cooler master", &["cooler master"]),
    ("nzxt", &["nzxt"]),
    ("dell", &["dell"]),
    ("lenovo", &["lenovo"]),
    ("acer", &["acer"]),
];
