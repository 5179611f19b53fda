/// 图库分类（Adobe Stock 分类表）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StockCategory {
    Animals = 1,
    BuildingsAndArchitecture = 2,
    Business = 3,
    Drinks = 4,
    TheEnvironment = 5,
    StatesOfMind = 6,
    Food = 7,
    GraphicResources = 8,
    HobbiesAndLeisure = 9,
    Industry = 10,
    Landscapes = 11,
    Lifestyle = 12,
    People = 13,
    PlantsAndFlowers = 14,
    CultureAndReligion = 15,
    Science = 16,
    SocialIssues = 17,
    Sports = 18,
    Technology = 19,
    Transport = 20,
    Travel = 21,
}

impl StockCategory {
    pub const ALL: [StockCategory; 21] = [
        StockCategory::Animals,
        StockCategory::BuildingsAndArchitecture,
        StockCategory::Business,
        StockCategory::Drinks,
        StockCategory::TheEnvironment,
        StockCategory::StatesOfMind,
        StockCategory::Food,
        StockCategory::GraphicResources,
        StockCategory::HobbiesAndLeisure,
        StockCategory::Industry,
        StockCategory::Landscapes,
        StockCategory::Lifestyle,
        StockCategory::People,
        StockCategory::PlantsAndFlowers,
        StockCategory::CultureAndReligion,
        StockCategory::Science,
        StockCategory::SocialIssues,
        StockCategory::Sports,
        StockCategory::Technology,
        StockCategory::Transport,
        StockCategory::Travel,
    ];

    /// 获取分类代码
    pub fn code(self) -> u8 {
        self as u8
    }

    /// 获取标准名称
    pub fn name(self) -> &'static str {
        match self {
            StockCategory::Animals => "Animals",
            StockCategory::BuildingsAndArchitecture => "Buildings and Architecture",
            StockCategory::Business => "Business",
            StockCategory::Drinks => "Drinks",
            StockCategory::TheEnvironment => "The Environment",
            StockCategory::StatesOfMind => "States of Mind",
            StockCategory::Food => "Food",
            StockCategory::GraphicResources => "Graphic Resources",
            StockCategory::HobbiesAndLeisure => "Hobbies and Leisure",
            StockCategory::Industry => "Industry",
            StockCategory::Landscapes => "Landscapes",
            StockCategory::Lifestyle => "Lifestyle",
            StockCategory::People => "People",
            StockCategory::PlantsAndFlowers => "Plants and Flowers",
            StockCategory::CultureAndReligion => "Culture and Religion",
            StockCategory::Science => "Science",
            StockCategory::SocialIssues => "Social Issues",
            StockCategory::Sports => "Sports",
            StockCategory::Technology => "Technology",
            StockCategory::Transport => "Transport",
            StockCategory::Travel => "Travel",
        }
    }

    /// 从代码解析分类
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    /// 从名称解析分类
    ///
    /// 忽略大小写、`&` 与 `and` 的差异以及首尾空白，也接受 `"13"` / `"13 - People"` 这样带代码的写法
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        let leading_code: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(code) = leading_code.parse::<u8>() {
            return Self::from_code(code);
        }

        let wanted = normalize(name);
        Self::ALL
            .iter()
            .copied()
            .find(|c| normalize(c.name()) == wanted)
    }
}

impl std::fmt::Display for StockCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn normalize(name: &str) -> String {
    name.to_lowercase()
        .replace('&', " and ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
