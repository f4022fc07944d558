use super::*;
use std::collections::HashSet;

fn up(suit: Suit, rank: u8) -> Card {
    Card {
        suit,
        rank,
        face_up: true,
    }
}

fn down(suit: Suit, rank: u8) -> Card {
    Card::new(suit, rank)
}

fn empty_game() -> Game {
    Game {
        seed: 0,
        stock: Vec::new(),
        waste: Vec::new(),
        foundations: vec![Vec::new(); FOUNDATIONS],
        tableau: vec![Vec::new(); TABLEAU_PILES],
        moves: 0,
        score: 0,
    }
}

#[test]
fn deal_lays_out_klondike_tableau() {
    let game = Game::new(42);
    for (index, pile) in game.tableau.iter().enumerate() {
        assert_eq!(pile.len(), index + 1);
        assert!(pile.last().expect("pile has a top").face_up);
        assert!(pile[..index].iter().all(|card| !card.face_up));
    }
    assert_eq!(game.stock.len(), 24);
    assert!(game.stock.iter().all(|card| !card.face_up));
    assert!(game.waste.is_empty());

    let mut seen = HashSet::new();
    for card in game.stock.iter().chain(game.tableau.iter().flatten()) {
        assert!(seen.insert((card.suit as u8, card.rank)));
    }
    assert_eq!(seen.len(), 52);
}

#[test]
fn same_seed_deals_same_game() {
    assert_eq!(Game::new(9), Game::new(9));
    assert_ne!(Game::new(1).stock, Game::new(2).stock);
}

#[test]
fn draw_turns_stock_card_onto_waste() {
    let mut game = Game::new(3);
    let expected = *game.stock.last().expect("stock top");
    game.draw().expect("draw");
    let top = game.top(Pile::Waste).expect("waste top");
    assert_eq!((top.suit, top.rank), (expected.suit, expected.rank));
    assert!(top.face_up);
    assert_eq!(game.stock.len(), 23);
    assert_eq!(game.moves, 1);
}

#[test]
fn empty_stock_recycles_waste_in_order() {
    let mut game = empty_game();
    game.score = 30;
    game.waste = vec![up(Suit::Clubs, 2), up(Suit::Hearts, 9), up(Suit::Spades, 5)];
    game.draw().expect("recycle");
    assert!(game.waste.is_empty());
    assert_eq!(game.stock.len(), 3);
    assert!(game.stock.iter().all(|card| !card.face_up));
    assert_eq!(game.score, 0);

    game.draw().expect("draw after recycle");
    assert_eq!(game.top(Pile::Waste).map(|c| c.rank), Some(2));
}

#[test]
fn drawing_from_nothing_is_illegal() {
    let mut game = empty_game();
    assert!(matches!(game.draw(), Err(UnibosError::IllegalMove(_))));
    assert_eq!(game.moves, 0);
}

#[test]
fn waste_to_tableau_requires_alternating_descending() {
    let mut game = empty_game();
    game.tableau[0] = vec![up(Suit::Spades, 8)];
    game.waste = vec![up(Suit::Clubs, 7)];
    assert!(game.move_cards(Pile::Waste, Pile::Tableau(0)).is_err());

    game.waste = vec![up(Suit::Hearts, 7)];
    game.move_cards(Pile::Waste, Pile::Tableau(0)).expect("red 7 on black 8");
    assert_eq!(game.tableau[0].len(), 2);
    assert_eq!(game.score, 5);
    assert_eq!(game.moves, 1);
}

#[test]
fn only_kings_start_empty_piles() {
    let mut game = empty_game();
    game.waste = vec![up(Suit::Hearts, 12)];
    assert!(game.move_cards(Pile::Waste, Pile::Tableau(3)).is_err());
    game.waste = vec![up(Suit::Hearts, 13)];
    game.move_cards(Pile::Waste, Pile::Tableau(3)).expect("king onto empty");
}

#[test]
fn tableau_run_moves_and_exposed_card_flips() {
    let mut game = empty_game();
    game.tableau[0] = vec![
        down(Suit::Clubs, 4),
        up(Suit::Hearts, 10),
        up(Suit::Spades, 9),
        up(Suit::Diamonds, 8),
    ];
    game.tableau[1] = vec![up(Suit::Clubs, 11)];
    game.move_cards(Pile::Tableau(0), Pile::Tableau(1))
        .expect("10-9-8 run onto black jack");
    assert_eq!(
        game.tableau[1].iter().map(|c| c.rank).collect::<Vec<_>>(),
        vec![11, 10, 9, 8]
    );
    assert_eq!(game.tableau[0].len(), 1);
    assert!(game.tableau[0][0].face_up);
    assert_eq!(game.score, 5);
}

#[test]
fn tableau_move_picks_the_run_that_fits() {
    let mut game = empty_game();
    game.tableau[0] = vec![up(Suit::Hearts, 10), up(Suit::Spades, 9), up(Suit::Diamonds, 8)];
    game.tableau[1] = vec![up(Suit::Hearts, 10)];
    game.move_cards(Pile::Tableau(0), Pile::Tableau(1))
        .expect("black 9 run fits red 10");
    assert_eq!(game.tableau[0].len(), 1);
    assert_eq!(game.tableau[1].len(), 3);
}

#[test]
fn moving_onto_the_same_pile_is_illegal() {
    let mut game = Game::new(5);
    assert!(game.move_cards(Pile::Tableau(2), Pile::Tableau(2)).is_err());
    assert!(game.move_cards(Pile::Stock, Pile::Tableau(2)).is_err());
}

#[test]
fn foundations_build_up_by_suit_from_ace() {
    let mut game = empty_game();
    game.waste = vec![up(Suit::Hearts, 2)];
    assert!(game.move_cards(Pile::Waste, Pile::Foundation(0)).is_err());

    game.waste = vec![up(Suit::Hearts, 2), up(Suit::Hearts, 1)];
    game.move_cards(Pile::Waste, Pile::Foundation(0)).expect("ace");
    game.move_cards(Pile::Waste, Pile::Foundation(0)).expect("two");
    assert_eq!(game.foundations[0].len(), 2);
    assert_eq!(game.score, 20);

    game.waste = vec![up(Suit::Spades, 3)];
    assert!(game.move_cards(Pile::Waste, Pile::Foundation(0)).is_err());
}

#[test]
fn auto_to_foundation_finds_target() {
    let mut game = empty_game();
    game.foundations[2] = vec![up(Suit::Clubs, 1)];
    game.tableau[4] = vec![down(Suit::Hearts, 6), up(Suit::Clubs, 2)];
    game.auto_to_foundation(Pile::Tableau(4)).expect("2 of clubs");
    assert_eq!(game.foundations[2].len(), 2);
    assert!(game.tableau[4][0].face_up);
    assert!(game.auto_to_foundation(Pile::Tableau(4)).is_err());
}

#[test]
fn foundation_to_tableau_costs_points() {
    let mut game = empty_game();
    game.score = 10;
    game.foundations[0] = vec![up(Suit::Hearts, 1), up(Suit::Hearts, 2)];
    game.tableau[0] = vec![up(Suit::Spades, 3)];
    game.move_cards(Pile::Foundation(0), Pile::Tableau(0))
        .expect("red 2 on black 3");
    assert_eq!(game.score, 0);
}

#[test]
fn game_is_won_when_all_foundations_complete() {
    let mut game = empty_game();
    assert!(!game.is_won());
    for (index, suit) in Suit::ALL.iter().enumerate() {
        game.foundations[index] = (1..=13).map(|rank| up(*suit, rank)).collect();
    }
    assert!(game.is_won());
}

#[test]
fn cursor_slots_map_to_piles() {
    for slot in 0..Pile::CURSOR_SLOTS {
        assert_eq!(Pile::from_cursor(slot).cursor(), slot);
    }
    assert_eq!(Pile::from_cursor(0), Pile::Stock);
    assert_eq!(Pile::from_cursor(5), Pile::Foundation(3));
    assert_eq!(Pile::from_cursor(6), Pile::Tableau(0));
}

#[test]
fn card_labels_use_faces_and_suits() {
    assert_eq!(up(Suit::Spades, 1).label(), "A♠");
    assert_eq!(up(Suit::Hearts, 10).label(), "10♥");
    assert_eq!(up(Suit::Diamonds, 12).label(), "Q♦");
}
