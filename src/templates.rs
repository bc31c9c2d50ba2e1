//! Built-in story data: offline fallback bodies, per-theme titles and tags.

pub const DEFAULT_THEME: &str = "relationship_drama";

pub fn fallback_body(theme: &str) -> &'static str {
    match theme {
        "workplace_stories" => {
            "I work at a mid-sized company and thought I had a good relationship with my colleagues. But yesterday something happened that made me question everything. I was in the break room when I overheard two of my coworkers talking about me behind my back. They were saying things that were not only untrue but could potentially damage my reputation at work. The worst part is that one of them is someone I considered a friend. I'm not sure if I should confront them directly, report it to HR, or just let it slide. The whole situation has made the work environment feel toxic, and I'm dreading going back in tomorrow. I've been at this job for three years and generally like the work, but this has really thrown me off."
        }
        "family_issues" => {
            "Family gatherings have always been a bit tense, but what happened at dinner last Sunday took things to a whole new level. My parents called a family meeting to tell us something they'd been hiding for months. Without going into too much detail, let's just say it involves money, lies, and decisions that affect our entire family's future. My siblings and I are all adults, but we were never consulted about this major life change that impacts all of us. The conversation escalated quickly, with everyone yelling and accusations flying. I ended up leaving early, and now no one is talking to each other. I love my family, but I'm not sure how we come back from this. The holidays are coming up and I honestly don't know if we'll all be in the same room again."
        }
        "friendship_conflicts" => {
            "I've known my best friend since college, and we've been through everything together. Or so I thought. Last month, I found out they've been spreading personal information I shared with them in confidence. It wasn't malicious, but it was deeply personal stuff about my mental health struggles and family issues. When I found out, I felt completely betrayed. I confronted them about it, and they apologized but also tried to justify it by saying they were worried about me and wanted to get other people's perspectives. I understand they meant well, but that's not their call to make. Trust is such a fundamental part of friendship, and I'm not sure if this is something we can move past. We haven't spoken in two weeks now, and I miss them, but I also feel like I can't trust them with anything personal anymore."
        }
        "life_decisions" => {
            "I'm at a crossroads in my life and I honestly don't know which direction to go. I've been working the same job for five years, and while it's stable and pays well, I'm completely miserable. I have an opportunity to pursue something I'm passionate about, but it would mean taking a huge financial risk and potentially disappointing my family who have certain expectations for my career. The safe choice is to stay where I am, keep climbing the corporate ladder, and maintain the lifestyle I've built. The risky choice is to follow my dreams, but there's no guarantee it will work out, and I could end up worse off than I am now. I'm in my early thirties, so I feel like this might be my last chance to make a major change. Everyone keeps giving me advice, but ultimately I'm the one who has to live with whatever choice I make."
        }
        "revenge_stories" => {
            "This is probably petty, but I don't care anymore. My neighbor has been making my life miserable for months. They play loud music at all hours, let their dog bark constantly, and have even blocked my driveway multiple times. I've tried talking to them politely, I've called the landlord, and I've even filed noise complaints, but nothing worked. They just laughed it off and kept doing whatever they wanted. So I decided to get creative with my response. Let's just say that what goes around comes around, and sometimes karma needs a little help. I won't go into specifics, but they're getting a taste of their own medicine now. Some people might think I went too far, but I tried being nice and reasonable first. Sometimes you have to stand up for yourself when people won't listen to common courtesy."
        }
        _ => {
            "So this happened last week and I'm still processing it. My partner and I have been together for two years, and I thought everything was going well. But then I discovered something on their phone that completely shattered my trust. I don't want to go into all the details, but let's just say they weren't being honest about where they were spending their evenings. When I confronted them about it, they got defensive and turned it around on me, saying I was being paranoid and controlling. I ended up walking out, and now I'm staying at my friend's place trying to figure out what to do next. Part of me wants to work things out, but another part feels like the trust is completely broken. Has anyone been through something similar?"
        }
    }
}

pub fn titles(theme: &str) -> &'static [&'static str] {
    match theme {
        "workplace_stories" => &[
            "My coworker is driving me insane",
            "Office drama that ruined my career",
            "I witnessed something terrible at work",
            "My boss crossed the line today",
        ],
        "family_issues" => &[
            "My family is tearing itself apart",
            "I discovered a family secret that changes everything",
            "My parents did something I can't forgive",
            "Family dinner from hell",
        ],
        "friendship_conflicts" => &[
            "My best friend betrayed me",
            "I lost my closest friend over this",
            "Friendship drama that escalated quickly",
            "My friend showed their true colors",
        ],
        "life_decisions" => &[
            "I made a decision that shocked everyone",
            "Should I have chosen differently?",
            "This choice changed my life forever",
            "Reddit, did I make the right call?",
        ],
        "revenge_stories" => &[
            "Sweet revenge on someone who wronged me",
            "They messed with the wrong person",
            "Karma came back around",
            "Justice served cold",
        ],
        _ => &[
            "AITA for what I did to my partner?",
            "My relationship just ended in the worst way",
            "I caught my partner doing something unforgivable",
            "Reddit, I need advice about my relationship",
        ],
    }
}

/// Theme-specific upload tags; unknown themes contribute none.
pub fn theme_tags(theme: &str) -> &'static [&'static str] {
    match theme {
        "relationship_drama" => &["relationship", "dating", "breakup", "love", "AITA"],
        "workplace_stories" => &["work", "office", "job", "career", "workplace"],
        "family_issues" => &["family", "parents", "siblings", "relatives"],
        "friendship_conflicts" => &["friends", "friendship", "betrayal", "trust"],
        "life_decisions" => &["life", "decisions", "choices", "advice"],
        "revenge_stories" => &["revenge", "justice", "karma", "payback"],
        _ => &[],
    }
}

pub const EXPANSIONS: &[&str] = &[
    " I've been thinking about this situation for days now, and I still can't believe it happened.",
    " The whole experience has really made me question a lot of things about my life.",
    " I keep replaying the events in my mind, wondering if I could have handled things differently.",
    " It's been really hard to focus on anything else since this happened.",
    " I'm hoping that sharing this here will help me process everything and maybe get some outside perspective.",
];

pub const PROFANITY: &[&str] = &["damn", "hell", "crap", "stupid", "idiot"];
